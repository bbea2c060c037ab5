use crate::parser::tja_parser::{
    BranchCondition, TjaCourse, TjaEventKind, TjaMeasure, TjaSong, BRANCH_SIDES,
};
use crate::{ConvertError, ConvertWarning};

/// Note classes after downgrading the exotic TJA symbols
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NoteKind {
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
    Adlib,
}

impl NoteKind {
    /// Classify a TJA note symbol; `None` for blanks.
    ///
    /// The bomb/fuse/green symbols (`C`..`I` minus the ADLIB `F`) have no
    /// fumen equivalent and are downgraded to plain hits.
    pub fn from_symbol(symbol: char, warnings: &mut Vec<ConvertWarning>) -> Option<Self> {
        match symbol {
            '0' => None,
            '1' => Some(NoteKind::Don),
            '2' => Some(NoteKind::Ka),
            '3' => Some(NoteKind::BigDon),
            '4' => Some(NoteKind::BigKa),
            '5' => Some(NoteKind::Roll),
            '6' => Some(NoteKind::BigRoll),
            '7' => Some(NoteKind::Balloon),
            '8' => Some(NoteKind::RollEnd),
            '9' => Some(NoteKind::Kusudama),
            'A' => Some(NoteKind::HandDon),
            'B' => Some(NoteKind::HandKa),
            'F' => Some(NoteKind::Adlib),
            'C' | 'D' | 'E' => {
                warnings.push(ConvertWarning::DowngradedNote {
                    symbol,
                    downgraded: "don",
                });
                Some(NoteKind::Don)
            }
            'G' | 'H' | 'I' => {
                warnings.push(ConvertWarning::DowngradedNote {
                    symbol,
                    downgraded: "big don",
                });
                Some(NoteKind::BigDon)
            }
            other => {
                warnings.push(ConvertWarning::SkippedSymbol(other));
                None
            }
        }
    }

    /// Whether the note opens a drumroll/balloon span closed by an `8`
    pub fn opens_roll(self) -> bool {
        matches!(
            self,
            NoteKind::Roll | NoteKind::BigRoll | NoteKind::Balloon | NoteKind::Kusudama
        )
    }
}

/// A note with its absolute millisecond timestamp
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CompiledNote {
    pub kind: NoteKind,
    /// `#SENOTECHANGE` voice override in effect, 0 when unset
    pub senote: u8,
    /// 0-based subposition within the source measure
    pub subpos: i32,
    /// Absolute offset from song start
    pub pos_ms: f64,
}

/// A measure with all `#COMMAND` state resolved into plain attributes.
///
/// Mid-measure BPM/scroll/gogo changes split a source measure into several
/// compiled sub-measures, so a compiled stream is often longer than the
/// source stream. `pos_start..pos_end` is the window of the source
/// subdivision grid covered by this (sub-)measure.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledMeasure {
    pub bpm: f64,
    pub scroll: f64,
    pub gogo: bool,
    pub barline: bool,
    pub time_sig: (i32, i32),
    pub subdivisions: i32,
    pub pos_start: i32,
    pub pos_end: i32,
    pub delay_ms: f64,
    pub start_ms: f64,
    pub end_ms: f64,
    pub duration_ms: f64,
    pub section: bool,
    pub levelhold: bool,
    pub branch_condition: Option<BranchCondition>,
    pub notes: Vec<CompiledNote>,
}

impl CompiledMeasure {
    /// Millisecond duration of the covered window at the measure's BPM
    fn window_duration(&self) -> f64 {
        let full = 4.0 * 60_000.0 / self.bpm;
        let size = self.time_sig.0 as f64 / self.time_sig.1 as f64;
        let ratio = if self.subdivisions == 0 {
            1.0
        } else {
            (self.pos_end - self.pos_start) as f64 / self.subdivisions as f64
        };
        full * size * ratio
    }
}

/// A whole course compiled into three equal-length branch streams
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledCourse {
    pub branches: [Vec<CompiledMeasure>; 3],
    pub has_branches: bool,
}

impl CompiledCourse {
    pub fn measure_count(&self) -> usize {
        self.branches[0].len()
    }
}

/// Resolve every command of a course into per-measure attributes and
/// absolute note timestamps, one stream per branch.
pub fn compile_course(
    song: &TjaSong,
    course: &TjaCourse,
    warnings: &mut Vec<ConvertWarning>,
) -> Result<CompiledCourse, ConvertError> {
    let mut branches: [Vec<CompiledMeasure>; 3] = Default::default();
    for side in BRANCH_SIDES {
        branches[side.index()] = compile_branch(
            song.bpm,
            song.offset,
            &course.branches[side.index()],
            warnings,
        )?;
    }

    if !course.has_branches {
        // Absent branches replay the normal chart
        branches[1] = branches[0].clone();
        branches[2] = branches[0].clone();
    } else {
        pad_branches(&mut branches, warnings);
    }

    Ok(CompiledCourse {
        branches,
        has_branches: course.has_branches,
    })
}

/// Sub-measure splitting can leave the streams with different lengths when
/// branch sections carry different mid-measure commands; shorter streams
/// are topped up by cloning from the longest one.
fn pad_branches(branches: &mut [Vec<CompiledMeasure>; 3], warnings: &mut Vec<ConvertWarning>) {
    let lens = [branches[0].len(), branches[1].len(), branches[2].len()];
    let max = lens.into_iter().max().unwrap_or(0);
    if lens.iter().all(|&l| l == max) {
        return;
    }
    warnings.push(ConvertWarning::BranchLengthPadded {
        normal: lens[0],
        advanced: lens[1],
        master: lens[2],
    });
    let source = if lens[0] == max {
        branches[0].clone()
    } else if lens[1] == max {
        branches[1].clone()
    } else {
        branches[2].clone()
    };
    for branch in branches.iter_mut() {
        let missing = branch.len()..max;
        branch.extend_from_slice(&source[missing]);
    }
}

/// Running command state while walking one branch stream
struct CommandState {
    bpm: f64,
    scroll: f64,
    gogo: bool,
    barline: bool,
    time_sig: (i32, i32),
    senote: u8,
    pending_delay_ms: f64,
}

impl CommandState {
    fn open_measure(&self, subdivisions: i32, pos_start: i32) -> CompiledMeasure {
        CompiledMeasure {
            bpm: self.bpm,
            scroll: self.scroll,
            gogo: self.gogo,
            barline: self.barline,
            time_sig: self.time_sig,
            subdivisions,
            pos_start,
            pos_end: subdivisions,
            delay_ms: 0.0,
            start_ms: 0.0,
            end_ms: 0.0,
            duration_ms: 0.0,
            section: false,
            levelhold: false,
            branch_condition: None,
            notes: vec![],
        }
    }
}

fn compile_branch(
    song_bpm: f64,
    song_offset: f64,
    measures: &[TjaMeasure],
    warnings: &mut Vec<ConvertWarning>,
) -> Result<Vec<CompiledMeasure>, ConvertError> {
    let mut out: Vec<CompiledMeasure> = vec![];
    let mut state = CommandState {
        bpm: song_bpm,
        scroll: 1.0,
        gogo: false,
        barline: true,
        time_sig: (4, 4),
        senote: 0,
        pending_delay_ms: 0.0,
    };

    for measure in measures {
        let subdivisions = measure.notes.len() as i32;
        let mut current = state.open_measure(subdivisions, 0);
        current.delay_ms = state.pending_delay_ms;
        state.pending_delay_ms = 0.0;

        // Walk subpositions in order, applying the events at each position
        // before consuming the note there.
        let mut events = measure.events.iter().peekable();
        for subpos in 0..=subdivisions {
            while let Some(event) = events.peek() {
                if event.pos > subpos {
                    break;
                }
                let event = events.next().expect("peeked event");
                apply_event(
                    &event.kind,
                    subpos,
                    subdivisions,
                    &mut state,
                    &mut current,
                    &mut out,
                    warnings,
                );
            }
            if subpos < subdivisions {
                let symbol = measure.notes[subpos as usize];
                if let Some(kind) = NoteKind::from_symbol(symbol, warnings) {
                    let senote = match kind {
                        NoteKind::Don | NoteKind::Ka => state.senote,
                        _ => 0,
                    };
                    current.notes.push(CompiledNote {
                        kind,
                        senote,
                        subpos,
                        pos_ms: 0.0,
                    });
                }
            }
        }
        current.pos_end = subdivisions;
        out.push(current);
    }

    // Timing pass: chain measure offsets and place notes on the grid
    let mut cursor = -song_offset * 1000.0;
    for measure in &mut out {
        measure.duration_ms = measure.window_duration();
        measure.start_ms = cursor + measure.delay_ms;
        measure.end_ms = measure.start_ms + measure.duration_ms;
        cursor = measure.end_ms;

        let width = measure.pos_end - measure.pos_start;
        for note in &mut measure.notes {
            let ratio = if width == 0 {
                0.0
            } else {
                (note.subpos - measure.pos_start) as f64 / width as f64
            };
            note.pos_ms = measure.start_ms + measure.duration_ms * ratio;
        }

        // Sub-measures starting inside a bar never draw a barline
        if measure.pos_start != 0 {
            measure.barline = false;
        }
    }

    Ok(out)
}

#[allow(clippy::too_many_arguments)]
fn apply_event(
    kind: &TjaEventKind,
    subpos: i32,
    subdivisions: i32,
    state: &mut CommandState,
    current: &mut CompiledMeasure,
    out: &mut Vec<CompiledMeasure>,
    warnings: &mut Vec<ConvertWarning>,
) {
    // An event sitting on the measure end only affects what follows
    let at_end = subpos == subdivisions && subdivisions > 0;
    match kind {
        TjaEventKind::Delay(seconds) => {
            let mut delay_ms = seconds * 1000.0;
            if delay_ms < 0.0 {
                warnings.push(ConvertWarning::NegativeDelay);
                delay_ms = 0.0;
            }
            if at_end {
                state.pending_delay_ms += delay_ms;
            } else {
                current.delay_ms += delay_ms;
            }
        }
        TjaEventKind::BranchStart(condition) => current.branch_condition = Some(*condition),
        TjaEventKind::Section => current.section = true,
        TjaEventKind::LevelHold => current.levelhold = true,
        TjaEventKind::SenoteChange(senote) => state.senote = *senote,
        TjaEventKind::Barline(on) => {
            state.barline = *on;
            if !at_end {
                current.barline = *on;
            }
        }
        TjaEventKind::TimeSignature(num, den) => {
            state.time_sig = (*num, *den);
            if subpos == 0 {
                current.time_sig = state.time_sig;
            }
        }
        TjaEventKind::BpmChange(bpm) => {
            state.bpm = *bpm;
            split_or_set(subpos, at_end, state, current, out, |m, s| m.bpm = s.bpm);
        }
        TjaEventKind::Scroll(scroll) => {
            state.scroll = *scroll;
            split_or_set(subpos, at_end, state, current, out, |m, s| {
                m.scroll = s.scroll
            });
        }
        TjaEventKind::Gogo(gogo) => {
            state.gogo = *gogo;
            split_or_set(subpos, at_end, state, current, out, |m, s| m.gogo = s.gogo);
        }
    }
}

/// Mid-measure BPM/SCROLL/GOGO changes close the current sub-measure and
/// open a new one from the change position; changes on the measure start
/// (or on a position that already opened a sub-measure) mutate it in
/// place, and changes on the measure end touch only the running state.
fn split_or_set(
    subpos: i32,
    at_end: bool,
    state: &CommandState,
    current: &mut CompiledMeasure,
    out: &mut Vec<CompiledMeasure>,
    set: impl Fn(&mut CompiledMeasure, &CommandState),
) {
    if at_end {
        return;
    }
    if subpos == current.pos_start {
        set(current, state);
        return;
    }
    let subdivisions = current.subdivisions;
    let mut closed = std::mem::replace(current, state.open_measure(subdivisions, subpos));
    closed.pos_end = subpos;
    out.push(closed);
}
