use std::fs;
use std::io::{self, Write};
use std::path::Path;

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};

use crate::parser::fumen_parser::{FumenCourse, FumenHeader, HEADER_SIZE};
use crate::parser::primitive_parser::ByteOrder;
use crate::ConvertError;

/// Serialize a fumen course and write it to `path`.
pub fn write_fumen(path: &Path, course: &FumenCourse) -> Result<(), ConvertError> {
    let bytes = fumen_to_bytes(course)?;
    fs::write(path, bytes)?;
    log::info!("wrote fumen file {}", path.display());
    Ok(())
}

/// Serialize a fumen course into the binary `.bin` layout.
///
/// The byte order stored on the header is honored, so a course parsed from
/// a big-endian file round-trips byte-for-byte.
pub fn fumen_to_bytes(course: &FumenCourse) -> Result<Vec<u8>, ConvertError> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + 8 + course.measures.len() * 128);
    encode(&mut buf, course).map_err(|err| ConvertError::IoError(err.to_string()))?;
    Ok(buf)
}

/// Byte emitter dispatching on the course byte order
struct ByteSink<W: Write> {
    inner: W,
    order: ByteOrder,
}

impl<W: Write> ByteSink<W> {
    fn put_u8(&mut self, value: u8) -> io::Result<()> {
        self.inner.write_u8(value)
    }

    fn put_u16(&mut self, value: u16) -> io::Result<()> {
        match self.order {
            ByteOrder::Little => self.inner.write_u16::<LittleEndian>(value),
            ByteOrder::Big => self.inner.write_u16::<BigEndian>(value),
        }
    }

    fn put_u32(&mut self, value: u32) -> io::Result<()> {
        match self.order {
            ByteOrder::Little => self.inner.write_u32::<LittleEndian>(value),
            ByteOrder::Big => self.inner.write_u32::<BigEndian>(value),
        }
    }

    fn put_i32(&mut self, value: i32) -> io::Result<()> {
        match self.order {
            ByteOrder::Little => self.inner.write_i32::<LittleEndian>(value),
            ByteOrder::Big => self.inner.write_i32::<BigEndian>(value),
        }
    }

    fn put_f32(&mut self, value: f32) -> io::Result<()> {
        match self.order {
            ByteOrder::Little => self.inner.write_f32::<LittleEndian>(value),
            ByteOrder::Big => self.inner.write_f32::<BigEndian>(value),
        }
    }
}

fn encode<W: Write>(writer: W, course: &FumenCourse) -> io::Result<()> {
    let mut sink = ByteSink {
        inner: writer,
        order: course.header.order,
    };
    encode_header(&mut sink, &course.header)?;

    sink.put_i32(course.measures.len() as i32)?;
    sink.put_u16(course.unknown_headroom.0)?;
    sink.put_u16(course.unknown_headroom.1)?;

    for measure in &course.measures {
        sink.put_f32(measure.bpm)?;
        sink.put_f32(measure.offset_start)?;
        sink.put_u8(measure.gogo as u8)?;
        sink.put_u8(measure.barline as u8)?;
        sink.put_u16(measure.padding1)?;
        for slot in measure.branch_info {
            sink.put_i32(slot)?;
        }
        sink.put_u32(measure.padding2)?;

        for branch in &measure.branches {
            sink.put_u16(branch.length())?;
            sink.put_f32(branch.speed)?;
            sink.put_u32(branch.padding)?;
            for note in &branch.notes {
                sink.put_u16(note.note_type.id())?;
                sink.put_f32(note.pos_ms)?;
                sink.put_u32(note.item_id)?;
                sink.put_u16(note.padding)?;
                sink.put_u16(note.score_init)?;
                sink.put_u16(note.score_diff)?;
                if note.note_type.has_duration() {
                    sink.put_f32(note.duration_ms)?;
                }
            }
        }
    }
    Ok(())
}

fn encode_header<W: Write>(sink: &mut ByteSink<W>, header: &FumenHeader) -> io::Result<()> {
    for window in header.timing_windows {
        sink.put_f32(window)?;
    }
    let table = [
        header.has_branches,
        header.hp_max,
        header.hp_clear,
        header.hp_gain_good,
        header.hp_gain_ok,
        header.hp_loss_bad,
        header.normal_normal_ratio,
        header.normal_advanced_ratio,
        header.normal_master_ratio,
        header.branch_pts_good,
        header.branch_pts_ok,
        header.branch_pts_bad,
        header.branch_pts_drumroll,
        header.branch_pts_good_big,
        header.branch_pts_ok_big,
        header.branch_pts_drumroll_big,
        header.branch_pts_balloon,
        header.branch_pts_kusudama,
        header.branch_pts_unknown,
    ];
    for entry in table {
        sink.put_i32(entry)?;
    }
    sink.put_u8(header.difficulty)?;
    sink.put_u8(header.stars)?;
    sink.put_u16(header.score_init)?;
    sink.put_u16(header.score_diff)?;
    sink.put_u8(header.style)?;
    sink.put_u8(header.is_papamama)?;
    sink.inner.write_all(&header.reserved)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::fumen_parser::{
        parse_fumen_data, FumenBranch, FumenMeasure, FumenNote, FumenNoteType,
    };

    fn sample_course(order: ByteOrder) -> FumenCourse {
        let mut note = FumenNote::new(FumenNoteType::Don);
        note.pos_ms = 250.0;
        note.score_init = 390;
        note.score_diff = 100;
        let mut roll = FumenNote::new(FumenNoteType::Roll);
        roll.pos_ms = 500.0;
        roll.duration_ms = 1500.0;
        let measure = FumenMeasure {
            bpm: 120.0,
            offset_start: 0.0,
            gogo: true,
            barline: true,
            branches: [
                FumenBranch {
                    speed: 1.0,
                    padding: 0,
                    notes: vec![note, roll],
                },
                FumenBranch::default(),
                FumenBranch::default(),
            ],
            ..FumenMeasure::default()
        };
        let mut header = FumenHeader::default();
        header.order = order;
        FumenCourse {
            header,
            score_init: 390,
            score_diff: 100,
            unknown_headroom: (0, 0),
            measures: vec![measure],
        }
    }

    #[test]
    fn test_header_is_520_bytes() {
        let course = FumenCourse::default();
        let bytes = fumen_to_bytes(&course).unwrap();
        // header + measure count + headroom shorts
        assert_eq!(bytes.len(), HEADER_SIZE + 8);
    }

    #[test]
    fn test_write_parse_roundtrip_little_endian() {
        let course = sample_course(ByteOrder::Little);
        let bytes = fumen_to_bytes(&course).unwrap();
        let parsed = parse_fumen_data(&bytes, false).unwrap();
        let rewritten = fumen_to_bytes(&parsed).unwrap();
        assert_eq!(bytes, rewritten);
    }

    #[test]
    fn test_write_parse_roundtrip_big_endian() {
        let course = sample_course(ByteOrder::Big);
        let bytes = fumen_to_bytes(&course).unwrap();
        let parsed = parse_fumen_data(&bytes, false).unwrap();
        assert_eq!(parsed.header.order, ByteOrder::Big);
        let rewritten = fumen_to_bytes(&parsed).unwrap();
        assert_eq!(bytes, rewritten);
    }

    #[test]
    fn test_parsed_notes_survive_roundtrip() {
        let course = sample_course(ByteOrder::Little);
        let bytes = fumen_to_bytes(&course).unwrap();
        let parsed = parse_fumen_data(&bytes, false).unwrap();
        let notes = &parsed.measures[0].branches[0].notes;
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].note_type, FumenNoteType::Don);
        assert_eq!(notes[0].score_init, 390);
        assert_eq!(notes[1].note_type, FumenNoteType::Roll);
        assert_eq!(notes[1].duration_ms, 1500.0);
    }

    #[test]
    fn test_truncated_data_is_rejected() {
        let course = sample_course(ByteOrder::Little);
        let bytes = fumen_to_bytes(&course).unwrap();
        let result = parse_fumen_data(&bytes[..bytes.len() - 4], false);
        assert!(matches!(
            result,
            Err(crate::ConvertError::FumenReadError(_))
        ));
    }

    #[test]
    fn test_unknown_note_type_is_rejected() {
        let course = sample_course(ByteOrder::Little);
        let mut bytes = fumen_to_bytes(&course).unwrap();
        // corrupt the first note's type id (right after the branch record)
        let note_offset = HEADER_SIZE + 8 + 40 + 10;
        bytes[note_offset] = 0x62;
        let result = parse_fumen_data(&bytes, false);
        assert!(matches!(
            result,
            Err(crate::ConvertError::FumenReadError(_))
        ));
    }
}
