use std::fs;
use std::path::Path;

use nom::IResult;

use crate::parser::primitive_parser::{
    parse_bytes, parse_f32, parse_i32, parse_u16, parse_u32, parse_u8, ByteOrder,
};
use crate::parser::tja_parser::Difficulty;
use crate::ConvertError;

/// Size of the fixed fumen header in bytes
pub const HEADER_SIZE: usize = 520;

/// Smallest possible note record (no duration field)
const NOTE_RECORD_SIZE: usize = 16;

/// Smallest possible measure record (empty branches)
const MEASURE_RECORD_SIZE: usize = 40 + 3 * 10;

/// Timing windows (good, ok, bad) in milliseconds per difficulty tier
const TIMING_WINDOWS_EASY_NORMAL: [f32; 3] = [41.7083358764648, 108.441665649414, 125.125];
const TIMING_WINDOWS_HARD_ONI: [f32; 3] = [25.0250015258789, 75.075004577637, 108.441665649414];

/// Note types of the fumen binary format
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FumenNoteType {
    Don,
    Ka,
    BigDon,
    BigKa,
    Roll,
    BigRoll,
    Balloon,
    RollEnd,
    Kusudama,
    HandDon,
    HandKa,
    /// ド voice override
    SenoteDo,
    /// コ voice override
    SenoteKo,
    /// カッ voice override
    SenoteKat,
    Adlib,
}

impl FumenNoteType {
    pub fn id(self) -> u16 {
        match self {
            FumenNoteType::Don => 0x1,
            FumenNoteType::Ka => 0x2,
            FumenNoteType::BigDon => 0x3,
            FumenNoteType::BigKa => 0x4,
            FumenNoteType::Roll => 0x5,
            FumenNoteType::BigRoll => 0x6,
            FumenNoteType::Balloon => 0x7,
            FumenNoteType::RollEnd => 0x8,
            FumenNoteType::Kusudama => 0x9,
            FumenNoteType::HandDon => 0xa,
            FumenNoteType::HandKa => 0xb,
            FumenNoteType::SenoteDo => 0xc,
            FumenNoteType::SenoteKo => 0xd,
            FumenNoteType::SenoteKat => 0xe,
            FumenNoteType::Adlib => 0xf,
        }
    }

    pub fn from_id(id: u16) -> Option<Self> {
        match id {
            0x1 => Some(FumenNoteType::Don),
            0x2 => Some(FumenNoteType::Ka),
            0x3 => Some(FumenNoteType::BigDon),
            0x4 => Some(FumenNoteType::BigKa),
            0x5 => Some(FumenNoteType::Roll),
            0x6 => Some(FumenNoteType::BigRoll),
            0x7 => Some(FumenNoteType::Balloon),
            0x8 => Some(FumenNoteType::RollEnd),
            0x9 => Some(FumenNoteType::Kusudama),
            0xa => Some(FumenNoteType::HandDon),
            0xb => Some(FumenNoteType::HandKa),
            0xc => Some(FumenNoteType::SenoteDo),
            0xd => Some(FumenNoteType::SenoteKo),
            0xe => Some(FumenNoteType::SenoteKat),
            0xf => Some(FumenNoteType::Adlib),
            _ => None,
        }
    }

    /// Roll-like notes carry an extra `duration_ms` float in the binary
    pub fn has_duration(self) -> bool {
        matches!(
            self,
            FumenNoteType::Roll
                | FumenNoteType::BigRoll
                | FumenNoteType::Balloon
                | FumenNoteType::Kusudama
        )
    }

    /// Balloon-like notes store their hit count in the score_init slot
    pub fn is_balloon(self) -> bool {
        matches!(self, FumenNoteType::Balloon | FumenNoteType::Kusudama)
    }
}

/// A single note record
#[derive(Debug, Clone, PartialEq)]
pub struct FumenNote {
    pub note_type: FumenNoteType,
    /// Offset from the measure start
    pub pos_ms: f32,
    /// Balloon cursor index for balloon notes, 0 otherwise
    pub item_id: u32,
    pub padding: u16,
    /// Hit count for balloon notes, course score otherwise
    pub score_init: u16,
    pub score_diff: u16,
    /// Roll span; meaningful only for duration-bearing types
    pub duration_ms: f32,
}

impl FumenNote {
    pub fn new(note_type: FumenNoteType) -> Self {
        FumenNote {
            note_type,
            pos_ms: 0.0,
            item_id: 0,
            padding: 0,
            score_init: 0,
            score_diff: 0,
            duration_ms: 0.0,
        }
    }
}

/// One of the three note tables of a measure
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FumenBranch {
    /// Scroll speed multiplier
    pub speed: f32,
    pub padding: u32,
    pub notes: Vec<FumenNote>,
}

impl FumenBranch {
    pub fn length(&self) -> u16 {
        self.notes.len() as u16
    }
}

/// A single measure record with its three branches
#[derive(Debug, Clone, PartialEq)]
pub struct FumenMeasure {
    pub bpm: f32,
    /// Milliseconds from song start
    pub offset_start: f32,
    /// Recomputed on read, not persisted
    pub offset_end: f32,
    /// Recomputed on read, not persisted
    pub duration: f32,
    pub gogo: bool,
    pub barline: bool,
    /// Accuracy reset flag for `#SECTION` measures
    pub padding1: u16,
    /// Gate thresholds by kind: accuracy/roll/score pairs, -1 when unused
    pub branch_info: [i32; 6],
    pub padding2: u32,
    /// (normal, advanced, master)
    pub branches: [FumenBranch; 3],
}

impl Default for FumenMeasure {
    fn default() -> Self {
        FumenMeasure {
            bpm: 0.0,
            offset_start: 0.0,
            offset_end: 0.0,
            duration: 0.0,
            gogo: false,
            barline: true,
            padding1: 0,
            branch_info: [-1; 6],
            padding2: 0,
            branches: Default::default(),
        }
    }
}

impl FumenMeasure {
    pub fn is_empty(&self) -> bool {
        self.branches.iter().all(|b| b.notes.is_empty())
    }
}

/// The fixed 520-byte fumen header
#[derive(Debug, Clone, PartialEq)]
pub struct FumenHeader {
    /// Byte order of the backing file; fresh conversions are little-endian
    pub order: ByteOrder,
    pub timing_windows: [f32; 108],
    pub has_branches: i32,
    pub hp_max: i32,
    pub hp_clear: i32,
    pub hp_gain_good: i32,
    pub hp_gain_ok: i32,
    pub hp_loss_bad: i32,
    pub normal_normal_ratio: i32,
    pub normal_advanced_ratio: i32,
    pub normal_master_ratio: i32,
    pub branch_pts_good: i32,
    pub branch_pts_ok: i32,
    pub branch_pts_bad: i32,
    pub branch_pts_drumroll: i32,
    pub branch_pts_good_big: i32,
    pub branch_pts_ok_big: i32,
    pub branch_pts_drumroll_big: i32,
    pub branch_pts_balloon: i32,
    pub branch_pts_kusudama: i32,
    pub branch_pts_unknown: i32,
    pub difficulty: u8,
    pub stars: u8,
    pub score_init: u16,
    pub score_diff: u16,
    /// 0 single player, 1 double
    pub style: u8,
    pub is_papamama: u8,
    /// Trailing reserved bytes, preserved verbatim from parsed files
    pub reserved: [u8; 4],
}

impl Default for FumenHeader {
    fn default() -> Self {
        let mut timing_windows = [0f32; 108];
        for chunk in timing_windows.chunks_exact_mut(3) {
            chunk.copy_from_slice(&TIMING_WINDOWS_HARD_ONI);
        }
        FumenHeader {
            order: ByteOrder::Little,
            timing_windows,
            has_branches: 0,
            hp_max: 10_000,
            hp_clear: 8_000,
            hp_gain_good: 10,
            hp_gain_ok: 5,
            hp_loss_bad: -20,
            normal_normal_ratio: 65_536,
            normal_advanced_ratio: 65_536,
            normal_master_ratio: 65_536,
            branch_pts_good: 20,
            branch_pts_ok: 10,
            branch_pts_bad: 0,
            branch_pts_drumroll: 1,
            branch_pts_good_big: 20,
            branch_pts_ok_big: 10,
            branch_pts_drumroll_big: 1,
            branch_pts_balloon: 30,
            branch_pts_kusudama: 30,
            branch_pts_unknown: 20,
            difficulty: Difficulty::Oni.index(),
            stars: 0,
            score_init: 0,
            score_diff: 0,
            style: 0,
            is_papamama: 0,
            reserved: [0; 4],
        }
    }
}

impl FumenHeader {
    /// Header for a fresh conversion of the given course
    pub fn for_course(difficulty: Difficulty, stars: u8, score_init: u16, score_diff: u16) -> Self {
        let windows = match difficulty {
            Difficulty::Easy | Difficulty::Normal => TIMING_WINDOWS_EASY_NORMAL,
            Difficulty::Hard | Difficulty::Oni | Difficulty::Ura => TIMING_WINDOWS_HARD_ONI,
        };
        let mut timing_windows = [0f32; 108];
        for chunk in timing_windows.chunks_exact_mut(3) {
            chunk.copy_from_slice(&windows);
        }
        let hp_clear = match difficulty {
            Difficulty::Easy => 6_000,
            Difficulty::Normal | Difficulty::Hard => 7_000,
            Difficulty::Oni | Difficulty::Ura => 8_000,
        };
        FumenHeader {
            timing_windows,
            hp_clear,
            difficulty: difficulty.index(),
            stars,
            score_init,
            score_diff,
            ..FumenHeader::default()
        }
    }
}

/// All the data of a single fumen (`.bin`) chart file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FumenCourse {
    pub header: FumenHeader,
    pub score_init: i32,
    pub score_diff: i32,
    /// Headroom shorts after the measure count, preserved verbatim
    pub unknown_headroom: (u16, u16),
    pub measures: Vec<FumenMeasure>,
}

/// Parse a fumen `.bin` file from disk.
///
/// `exclude_empty_measures` drops the spacer measures official charts use
/// for barline effects; useful when comparing timing against converted
/// charts.
pub fn parse_fumen(path: &Path, exclude_empty_measures: bool) -> Result<FumenCourse, ConvertError> {
    let data = fs::read(path)?;
    parse_fumen_data(&data, exclude_empty_measures)
}

/// Parse raw fumen bytes.
pub fn parse_fumen_data(
    data: &[u8],
    exclude_empty_measures: bool,
) -> Result<FumenCourse, ConvertError> {
    if data.len() < HEADER_SIZE + 8 {
        return Err(ConvertError::FumenReadError(format!(
            "file too short for a fumen header: {} bytes",
            data.len()
        )));
    }
    let order = detect_byte_order(data);
    log::debug!("detected fumen byte order: {order:?}");

    let (rest, header) = parse_header(data, order).map_err(|_| truncated("header"))?;

    let (rest, measure_count) = parse_i32(order)(rest).map_err(|_| truncated("measure count"))?;
    let (mut rest, headroom) = parse_headroom(rest, order).map_err(|_| truncated("headroom"))?;

    if measure_count < 0 || measure_count as usize * MEASURE_RECORD_SIZE > rest.len() {
        return Err(ConvertError::FumenReadError(format!(
            "measure count {measure_count} exceeds file size"
        )));
    }

    let mut course = FumenCourse {
        header,
        score_init: 0,
        score_diff: 0,
        unknown_headroom: headroom,
        measures: Vec::with_capacity(measure_count as usize),
    };

    for index in 0..measure_count {
        let (next, measure) = parse_measure(rest, order).map_err(|err| {
            log::error!("failed to parse measure {index}: {err:?}");
            truncated("measure record")
        })?;
        rest = next;
        course.measures.push(measure);
    }

    course.score_init = course.header.score_init as i32;
    course.score_diff = course.header.score_diff as i32;
    recompute_measure_spans(&mut course.measures);

    if exclude_empty_measures {
        course.measures.retain(|m| !m.is_empty());
    }

    Ok(course)
}

fn truncated(what: &str) -> ConvertError {
    ConvertError::FumenReadError(format!("truncated fumen data while reading {what}"))
}

/// Decode the first timing window as little-endian; an implausible value
/// means the file is big-endian.
fn detect_byte_order(data: &[u8]) -> ByteOrder {
    let probe = f32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    if probe.is_finite() && probe > 0.0 && probe < 10_000.0 {
        ByteOrder::Little
    } else {
        ByteOrder::Big
    }
}

fn parse_headroom(i: &[u8], order: ByteOrder) -> IResult<&[u8], (u16, u16)> {
    let (i, first) = parse_u16(order)(i)?;
    let (i, second) = parse_u16(order)(i)?;
    Ok((i, (first, second)))
}

fn parse_header(i: &[u8], order: ByteOrder) -> IResult<&[u8], FumenHeader> {
    let mut timing_windows = [0f32; 108];
    let mut i = i;
    for window in &mut timing_windows {
        let (next, value) = parse_f32(order)(i)?;
        *window = value;
        i = next;
    }
    let mut table = [0i32; 19];
    for entry in &mut table {
        let (next, value) = parse_i32(order)(i)?;
        *entry = value;
        i = next;
    }
    let (i, difficulty) = parse_u8(i)?;
    let (i, stars) = parse_u8(i)?;
    let (i, score_init) = parse_u16(order)(i)?;
    let (i, score_diff) = parse_u16(order)(i)?;
    let (i, style) = parse_u8(i)?;
    let (i, is_papamama) = parse_u8(i)?;
    let (i, reserved) = parse_bytes::<4>(i)?;

    let header = FumenHeader {
        order,
        timing_windows,
        has_branches: table[0],
        hp_max: table[1],
        hp_clear: table[2],
        hp_gain_good: table[3],
        hp_gain_ok: table[4],
        hp_loss_bad: table[5],
        normal_normal_ratio: table[6],
        normal_advanced_ratio: table[7],
        normal_master_ratio: table[8],
        branch_pts_good: table[9],
        branch_pts_ok: table[10],
        branch_pts_bad: table[11],
        branch_pts_drumroll: table[12],
        branch_pts_good_big: table[13],
        branch_pts_ok_big: table[14],
        branch_pts_drumroll_big: table[15],
        branch_pts_balloon: table[16],
        branch_pts_kusudama: table[17],
        branch_pts_unknown: table[18],
        difficulty,
        stars,
        score_init,
        score_diff,
        style,
        is_papamama,
        reserved,
    };
    Ok((i, header))
}

fn parse_measure(i: &[u8], order: ByteOrder) -> IResult<&[u8], FumenMeasure> {
    let (i, bpm) = parse_f32(order)(i)?;
    let (i, offset_start) = parse_f32(order)(i)?;
    let (i, gogo) = parse_u8(i)?;
    let (i, barline) = parse_u8(i)?;
    let (i, padding1) = parse_u16(order)(i)?;
    let mut branch_info = [0i32; 6];
    let mut i = i;
    for slot in &mut branch_info {
        let (next, value) = parse_i32(order)(i)?;
        *slot = value;
        i = next;
    }
    let (i, padding2) = parse_u32(order)(i)?;

    let mut measure = FumenMeasure {
        bpm,
        offset_start,
        offset_end: 0.0,
        duration: 0.0,
        gogo: gogo != 0,
        barline: barline != 0,
        padding1,
        branch_info,
        padding2,
        branches: Default::default(),
    };

    let mut i = i;
    for branch in &mut measure.branches {
        let (next, parsed) = parse_branch(i, order)?;
        *branch = parsed;
        i = next;
    }
    Ok((i, measure))
}

fn parse_branch(i: &[u8], order: ByteOrder) -> IResult<&[u8], FumenBranch> {
    let (i, length) = parse_u16(order)(i)?;
    let (i, speed) = parse_f32(order)(i)?;
    let (mut i, padding) = parse_u32(order)(i)?;

    if length as usize * NOTE_RECORD_SIZE > i.len() {
        log::error!("branch claims {length} notes but only {} bytes remain", i.len());
        return Err(nom::Err::Failure(nom::error::Error::new(
            i,
            nom::error::ErrorKind::Eof,
        )));
    }

    let mut branch = FumenBranch {
        speed,
        padding,
        notes: Vec::with_capacity(length as usize),
    };
    for _ in 0..length {
        let (next, note) = parse_note(i, order)?;
        i = next;
        branch.notes.push(note);
    }
    Ok((i, branch))
}

fn parse_note(i: &[u8], order: ByteOrder) -> IResult<&[u8], FumenNote> {
    let (i, type_id) = parse_u16(order)(i)?;
    let note_type = match FumenNoteType::from_id(type_id) {
        Some(note_type) => note_type,
        None => {
            log::error!("unknown fumen note type 0x{type_id:x}");
            return Err(nom::Err::Failure(nom::error::Error::new(
                i,
                nom::error::ErrorKind::Tag,
            )));
        }
    };
    let (i, pos_ms) = parse_f32(order)(i)?;
    let (i, item_id) = parse_u32(order)(i)?;
    let (i, padding) = parse_u16(order)(i)?;
    let (i, score_init) = parse_u16(order)(i)?;
    let (i, score_diff) = parse_u16(order)(i)?;
    let (i, duration_ms) = if note_type.has_duration() {
        parse_f32(order)(i)?
    } else {
        (i, 0.0)
    };
    Ok((
        i,
        FumenNote {
            note_type,
            pos_ms,
            item_id,
            padding,
            score_init,
            score_diff,
            duration_ms,
        },
    ))
}

/// Durations and end offsets are not persisted; rebuild them from the
/// distance to the next measure (one full 4/4 bar for the last one).
fn recompute_measure_spans(measures: &mut [FumenMeasure]) {
    let starts: Vec<f32> = measures.iter().map(|m| m.offset_start).collect();
    for (index, measure) in measures.iter_mut().enumerate() {
        let duration = match starts.get(index + 1) {
            Some(next_start) => next_start - measure.offset_start,
            None if measure.bpm > 0.0 => 4.0 * 60_000.0 / measure.bpm,
            None => 0.0,
        };
        measure.duration = duration;
        measure.offset_end = measure.offset_start + duration;
    }
}
