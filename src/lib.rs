//! tja2fumen - Taiko no Tatsujin chart converter
//!
//! This library provides:
//! - Parsing of community TJA charts (`.tja`), including branching charts,
//!   two-player styles and mid-measure tempo changes
//! - Conversion of parsed charts into the fumen (`.bin`) binary chart
//!   format used by official releases
//! - Parsing and re-writing of existing fumen binaries for inspection and
//!   round-trip testing
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use tja2fumen::{convert_tja_to_fumen, parse_tja, write_fumen};
//!
//! let song = parse_tja(Path::new("song.tja")).unwrap();
//! for (key, course) in convert_tja_to_fumen(&song).unwrap() {
//!     let out = format!("song_{}.bin", key.difficulty.file_id());
//!     write_fumen(Path::new(&out), &course).unwrap();
//! }
//! ```

pub mod converter;
pub mod error;
pub mod parser;
pub mod writer;

// Re-export main types for convenience
pub use converter::fumen_builder::{convert_course, convert_song, convert_tja_to_fumen};
pub use converter::measure_compiler::{
    compile_course, CompiledCourse, CompiledMeasure, CompiledNote, NoteKind,
};
pub use error::{ConvertError, ConvertWarning};
pub use parser::fumen_parser::{
    parse_fumen, parse_fumen_data, FumenBranch, FumenCourse, FumenHeader, FumenMeasure,
    FumenNote, FumenNoteType,
};
pub use parser::primitive_parser::ByteOrder;
pub use parser::tja_parser::{
    parse_tja, parse_tja_data, parse_tja_text, BranchCondition, BranchSide, CourseKey,
    Difficulty, PlayerSide, Style, TjaCourse, TjaEvent, TjaEventKind, TjaMeasure, TjaSong,
};
pub use writer::fumen_writer::{fumen_to_bytes, write_fumen};
