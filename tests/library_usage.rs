//! Integration tests for tja2fumen library usage.
//!
//! These tests verify that the library can be used as a dependency
//! from external projects.

use std::path::Path;

use tja2fumen::{
    convert_tja_to_fumen, fumen_to_bytes, parse_fumen_data, parse_tja_data, ConvertError,
    CourseKey, FumenCourse, TjaSong,
};

/// Test that all major types are accessible from the library.
#[test]
fn test_types_accessible() {
    // This test verifies that the public API types compile and are usable.
    // If any re-export is missing, this test will fail to compile.

    fn _assert_types() {
        let _: fn(&Path) -> Result<TjaSong, ConvertError> = tja2fumen::parse_tja;
        let _: fn(&Path, bool) -> Result<FumenCourse, ConvertError> = tja2fumen::parse_fumen;
        let _: fn(&Path, &FumenCourse) -> Result<(), ConvertError> = tja2fumen::write_fumen;
    }
}

/// Test converting an in-memory chart end to end.
#[test]
fn test_convert_chart() {
    let tja = "BPM:120\nOFFSET:0\nCOURSE:Oni\nLEVEL:9\n#START\n1011,\n2022,\n#END\n";
    let mut warnings = vec![];
    let song = parse_tja_data(tja.as_bytes(), &mut warnings).expect("failed to parse chart");
    assert!(warnings.is_empty());

    let converted = convert_tja_to_fumen(&song).expect("failed to convert chart");
    assert_eq!(converted.len(), 1);
    let course = converted.values().next().unwrap();
    assert_eq!(course.measures.len(), 2);
    assert_eq!(course.header.stars, 9);
}

/// Test serializing and re-parsing a converted chart.
#[test]
fn test_serialize_roundtrip() {
    let tja = "BPM:160\nOFFSET:0.5\nCOURSE:Hard\nBALLOON:5\n#START\n1020,\n7008,\n#END\n";
    let mut warnings = vec![];
    let song = parse_tja_data(tja.as_bytes(), &mut warnings).expect("failed to parse chart");
    let converted = convert_tja_to_fumen(&song).expect("failed to convert chart");
    let course = converted.values().next().unwrap();

    let bytes = fumen_to_bytes(course).expect("failed to serialize course");
    let parsed = parse_fumen_data(&bytes, false).expect("failed to re-parse course");
    assert_eq!(parsed.measures.len(), course.measures.len());

    let rewritten = fumen_to_bytes(&parsed).expect("failed to re-serialize course");
    assert_eq!(bytes, rewritten, "serialized form must be stable");
}

/// Test error handling for invalid data.
#[test]
fn test_parse_error() {
    let mut warnings = vec![];
    let result = parse_tja_data(b"#END\n", &mut warnings);
    assert!(result.is_err(), "should return error for invalid data");
    let err = result.unwrap_err();
    assert!(
        matches!(err, ConvertError::ParseError(_)),
        "should be a ParseError"
    );
}

/// Course keys order by difficulty, then player side.
#[test]
fn test_course_key_ordering() {
    let tja = "BPM:120\nOFFSET:0\n\
               COURSE:Ura\n#START\n1,\n#END\n\
               COURSE:Easy\n#START\n1,\n#END\n";
    let mut warnings = vec![];
    let song = parse_tja_data(tja.as_bytes(), &mut warnings).unwrap();
    let keys: Vec<CourseKey> = song.courses.keys().copied().collect();
    assert_eq!(keys[0].to_string(), "Easy");
    assert_eq!(keys[1].to_string(), "Ura");
}
