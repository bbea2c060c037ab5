use std::collections::BTreeMap;

use crate::converter::measure_compiler::{
    compile_course, CompiledCourse, CompiledMeasure, NoteKind,
};
use crate::parser::fumen_parser::{
    FumenCourse, FumenHeader, FumenMeasure, FumenNote, FumenNoteType,
};
use crate::parser::tja_parser::{
    BranchCondition, BranchSide, CourseKey, Style, TjaCourse, TjaSong, BRANCH_SIDES,
};
use crate::{ConvertError, ConvertWarning};

/// Fallback balloon hit count when the `BALLOON:` list runs dry
const DEFAULT_BALLOON_HITS: i32 = 5;

/// Gate value that no player can reach, used to freeze branching
const UNREACHABLE_ACCURACY: i32 = 999 * 4;
const UNREACHABLE_ROLLS: i32 = 999;
const UNREACHABLE_SCORE: i32 = 9_999_999;

/// Convert every course of a parsed TJA song, logging diagnostics.
pub fn convert_tja_to_fumen(
    song: &TjaSong,
) -> Result<BTreeMap<CourseKey, FumenCourse>, ConvertError> {
    let mut warnings = Vec::new();
    let converted = convert_song(song, &mut warnings);
    for warning in &warnings {
        log::warn!("{warning}");
    }
    converted
}

/// Convert every course of a parsed TJA song, collecting diagnostics.
pub fn convert_song(
    song: &TjaSong,
    warnings: &mut Vec<ConvertWarning>,
) -> Result<BTreeMap<CourseKey, FumenCourse>, ConvertError> {
    let mut converted = BTreeMap::new();
    for (key, course) in &song.courses {
        log::debug!("converting course {key}");
        converted.insert(*key, convert_course(song, course, warnings)?);
    }
    Ok(converted)
}

/// Convert a single course: compile its commands, then translate the
/// branch streams into the fumen measure/branch/note layout.
pub fn convert_course(
    song: &TjaSong,
    course: &TjaCourse,
    warnings: &mut Vec<ConvertWarning>,
) -> Result<FumenCourse, ConvertError> {
    let compiled = compile_course(song, course, warnings)?;
    FumenBuilder::new(course, warnings).build(&compiled)
}

/// A drumroll/balloon opened but not yet closed by an `8`
struct OpenRoll {
    measure: usize,
    note: usize,
    start_ms: f64,
    kusudama: bool,
}

/// Translates one compiled course into a `FumenCourse`.
struct FumenBuilder<'a> {
    course: &'a TjaCourse,
    warnings: &'a mut Vec<ConvertWarning>,
    /// Don/Ka hit counts per branch, for the header ratios
    note_counts: [u32; 3],
}

impl<'a> FumenBuilder<'a> {
    fn new(course: &'a TjaCourse, warnings: &'a mut Vec<ConvertWarning>) -> Self {
        FumenBuilder {
            course,
            warnings,
            note_counts: [0; 3],
        }
    }

    fn build(mut self, compiled: &CompiledCourse) -> Result<FumenCourse, ConvertError> {
        let normal = &compiled.branches[0];
        let mut measures: Vec<FumenMeasure> = normal.iter().map(shared_measure).collect();

        self.assign_branch_info(compiled, &mut measures);
        for side in BRANCH_SIDES {
            self.fill_branch(side, &compiled.branches[side.index()], &mut measures)?;
        }

        let mut header = FumenHeader::for_course(
            self.course.difficulty,
            self.course.level.clamp(0, u8::MAX as i32) as u8,
            clamp_score(self.course.score_init),
            clamp_score(self.course.score_diff),
        );
        header.style = match self.course.style {
            Style::Single => 0,
            Style::Double => 1,
        };
        header.has_branches = compiled.has_branches as i32;
        self.set_branch_points(normal, &mut header);
        self.set_note_ratios(&mut header);

        Ok(FumenCourse {
            header,
            score_init: self.course.score_init,
            score_diff: self.course.score_diff,
            unknown_headroom: (0, 0),
            measures,
        })
    }

    /// Attach every `#BRANCHSTART` condition to the measure preceding the
    /// fork, honoring any sticky `#LEVELHOLD` seen earlier.
    fn assign_branch_info(&mut self, compiled: &CompiledCourse, measures: &mut [FumenMeasure]) {
        let levelhold_from = levelhold_position(compiled);
        for (index, measure) in compiled.branches[0].iter().enumerate() {
            let Some(condition) = measure.branch_condition else {
                continue;
            };
            let target = index.saturating_sub(1);
            let frozen = levelhold_from.is_some_and(|(from, _)| index > from);
            let (slot, advanced, master) = match condition {
                BranchCondition::Accuracy { advanced, master } => (
                    0,
                    (advanced * 4.0).round() as i32,
                    (master * 4.0).round() as i32,
                ),
                BranchCondition::Drumroll { advanced, master } => (2, advanced, master),
                BranchCondition::Score { advanced, master } => (4, advanced, master),
            };
            let (advanced, master) = if frozen {
                let side = levelhold_from.map(|(_, side)| side).unwrap_or(BranchSide::Normal);
                freeze_gates(&condition, side)
            } else {
                (advanced, master)
            };
            measures[target].branch_info = [-1; 6];
            measures[target].branch_info[slot] = advanced;
            measures[target].branch_info[slot + 1] = master;
        }
    }

    /// Emit the notes of one branch stream into the fumen measures.
    fn fill_branch(
        &mut self,
        side: BranchSide,
        stream: &[CompiledMeasure],
        measures: &mut [FumenMeasure],
    ) -> Result<(), ConvertError> {
        let branch_index = side.index();
        let mut balloons = self.course.balloons.iter().copied();
        let mut last_balloon = None;
        let mut item_cursor: u32 = 0;
        let mut open_roll: Option<OpenRoll> = None;
        let mut roll_cut_at_fork = false;
        let score_init = clamp_score(self.course.score_init);
        let score_diff = clamp_score(self.course.score_diff);

        for (measure_index, compiled) in stream.iter().enumerate() {
            // A fork is a hard boundary for roll spans
            if compiled.branch_condition.is_some() {
                if let Some(roll) = open_roll.take() {
                    self.warnings.push(ConvertWarning::RollCutAtFork);
                    close_roll(measures, branch_index, &roll, compiled.start_ms);
                    roll_cut_at_fork = true;
                }
            }

            measures[measure_index].branches[branch_index].speed = compiled.scroll as f32;

            for note in &compiled.notes {
                let relative_ms = (note.pos_ms - compiled.start_ms) as f32;
                match note.kind {
                    NoteKind::RollEnd => {
                        match open_roll.take() {
                            Some(roll) => close_roll(measures, branch_index, &roll, note.pos_ms),
                            // the span already ended on a fork boundary
                            None if roll_cut_at_fork => roll_cut_at_fork = false,
                            None => {
                                return Err(ConvertError::ParseError(
                                    "'8' note without a matching drumroll/balloon/kusudama"
                                        .to_string(),
                                ));
                            }
                        }
                        let mut end = FumenNote::new(FumenNoteType::RollEnd);
                        end.pos_ms = relative_ms;
                        end.score_init = score_init;
                        end.score_diff = score_diff;
                        measures[measure_index].branches[branch_index].notes.push(end);
                    }
                    NoteKind::Kusudama
                        if open_roll.as_ref().is_some_and(|roll| roll.kusudama) =>
                    {
                        // Double kusudama collapses into a single one
                        log::debug!("skipping second kusudama of a pair");
                    }
                    kind if kind.opens_roll() => {
                        if let Some(previous) = open_roll.take() {
                            self.warnings.push(ConvertWarning::NestedRoll);
                            close_roll(measures, branch_index, &previous, note.pos_ms);
                        }
                        let note_type = match kind {
                            NoteKind::Roll => FumenNoteType::Roll,
                            NoteKind::BigRoll => FumenNoteType::BigRoll,
                            NoteKind::Balloon => FumenNoteType::Balloon,
                            _ => FumenNoteType::Kusudama,
                        };
                        let mut fumen_note = FumenNote::new(note_type);
                        fumen_note.pos_ms = relative_ms;
                        if note_type.is_balloon() {
                            let hits = match balloons.next() {
                                Some(hits) => hits,
                                None => {
                                    let hits =
                                        last_balloon.unwrap_or(DEFAULT_BALLOON_HITS);
                                    self.warnings
                                        .push(ConvertWarning::BalloonListPadded(hits));
                                    hits
                                }
                            };
                            last_balloon = Some(hits);
                            fumen_note.score_init = clamp_score(hits);
                            fumen_note.item_id = item_cursor;
                            item_cursor += 1;
                        } else {
                            fumen_note.score_init = score_init;
                            fumen_note.score_diff = score_diff;
                        }
                        let branch = &mut measures[measure_index].branches[branch_index];
                        branch.notes.push(fumen_note);
                        open_roll = Some(OpenRoll {
                            measure: measure_index,
                            note: branch.notes.len() - 1,
                            start_ms: note.pos_ms,
                            kusudama: kind == NoteKind::Kusudama,
                        });
                    }
                    kind => {
                        let mut fumen_note = FumenNote::new(plain_note_type(kind, note.senote));
                        fumen_note.pos_ms = relative_ms;
                        fumen_note.score_init = score_init;
                        fumen_note.score_diff = score_diff;
                        measures[measure_index].branches[branch_index]
                            .notes
                            .push(fumen_note);
                        self.note_counts[branch_index] += 1;
                    }
                }
            }
        }

        // A roll still open at the end of the chart closes on the last bar
        if let Some(roll) = open_roll.take() {
            self.warnings.push(ConvertWarning::UnterminatedRoll);
            let end_ms = stream.last().map_or(roll.start_ms, |m| m.end_ms);
            close_roll(measures, branch_index, &roll, end_ms);
        }
        Ok(())
    }

    /// Specialise the branch-point table for charts whose gates only ever
    /// look at drumrolls (or never do).
    fn set_branch_points(&self, normal: &[CompiledMeasure], header: &mut FumenHeader) {
        let conditions: Vec<BranchCondition> = normal
            .iter()
            .filter_map(|m| m.branch_condition)
            .collect();
        if conditions.is_empty() {
            return;
        }
        let drumroll_only = conditions.iter().all(|condition| match condition {
            BranchCondition::Drumroll { .. } => true,
            BranchCondition::Accuracy { advanced, master } => {
                (*advanced == 0.0 && *master == 0.0) || (*advanced > 100.0 && *master > 100.0)
            }
            BranchCondition::Score { .. } => false,
        });
        if drumroll_only {
            header.branch_pts_good = 0;
            header.branch_pts_good_big = 0;
            header.branch_pts_ok = 0;
            header.branch_pts_ok_big = 0;
            header.branch_pts_balloon = 0;
            header.branch_pts_kusudama = 0;
        }
        let percentage_only = conditions
            .iter()
            .all(|condition| !matches!(condition, BranchCondition::Drumroll { .. }));
        if percentage_only {
            header.branch_pts_drumroll = 0;
            header.branch_pts_drumroll_big = 0;
        }
    }

    /// Advanced/master note-count ratios relative to the normal branch
    fn set_note_ratios(&self, header: &mut FumenHeader) {
        let normal = self.note_counts[0];
        if self.note_counts[1] > 0 {
            header.normal_advanced_ratio =
                (65_536.0 * normal as f64 / self.note_counts[1] as f64) as i32;
        }
        if self.note_counts[2] > 0 {
            header.normal_master_ratio =
                (65_536.0 * normal as f64 / self.note_counts[2] as f64) as i32;
        }
    }
}

/// Earliest `#LEVELHOLD` across the three compiled streams; ties keep the
/// normal branch.
fn levelhold_position(compiled: &CompiledCourse) -> Option<(usize, BranchSide)> {
    let mut found: Option<(usize, BranchSide)> = None;
    for side in BRANCH_SIDES {
        let stream = &compiled.branches[side.index()];
        if let Some(index) = stream.iter().position(|m| m.levelhold) {
            match found {
                Some((best, _)) if best <= index => {}
                _ => found = Some((index, side)),
            }
        }
    }
    found
}

/// Measure-level properties shared by all branches, from the normal timeline
fn shared_measure(compiled: &CompiledMeasure) -> FumenMeasure {
    FumenMeasure {
        bpm: compiled.bpm as f32,
        offset_start: compiled.start_ms as f32,
        offset_end: compiled.end_ms as f32,
        duration: compiled.duration_ms as f32,
        gogo: compiled.gogo,
        barline: compiled.barline,
        padding1: compiled.section as u16,
        ..FumenMeasure::default()
    }
}

fn clamp_score(value: i32) -> u16 {
    value.clamp(0, u16::MAX as i32) as u16
}

/// Close an open roll span at an absolute millisecond position
fn close_roll(measures: &mut [FumenMeasure], branch: usize, roll: &OpenRoll, end_ms: f64) {
    let duration = (end_ms - roll.start_ms).max(0.0).trunc() as f32;
    measures[roll.measure].branches[branch].notes[roll.note].duration_ms = duration;
}

/// Gates that freeze the player on `side` for the rest of the chart
fn freeze_gates(condition: &BranchCondition, side: BranchSide) -> (i32, i32) {
    let unreachable = match condition {
        BranchCondition::Accuracy { .. } => UNREACHABLE_ACCURACY,
        BranchCondition::Drumroll { .. } => UNREACHABLE_ROLLS,
        BranchCondition::Score { .. } => UNREACHABLE_SCORE,
    };
    match side {
        BranchSide::Normal => (unreachable, unreachable),
        BranchSide::Advanced => (0, unreachable),
        BranchSide::Master => (0, 0),
    }
}

/// Fumen note type of a non-roll note, honoring `#SENOTECHANGE`
fn plain_note_type(kind: NoteKind, senote: u8) -> FumenNoteType {
    match kind {
        NoteKind::Don => match senote {
            1 => FumenNoteType::SenoteDo,
            2 => FumenNoteType::SenoteKo,
            _ => FumenNoteType::Don,
        },
        NoteKind::Ka => match senote {
            5 => FumenNoteType::SenoteKat,
            _ => FumenNoteType::Ka,
        },
        NoteKind::BigDon => FumenNoteType::BigDon,
        NoteKind::BigKa => FumenNoteType::BigKa,
        NoteKind::HandDon => FumenNoteType::HandDon,
        NoteKind::HandKa => FumenNoteType::HandKa,
        _ => FumenNoteType::Adlib,
    }
}
