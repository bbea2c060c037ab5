use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::parser::text_decoder::{chart_lines, decode_chart_bytes};
use crate::{ConvertError, ConvertWarning};

// TJA format reference thanks to the TJA format wiki and the charting
// community docs shipped with the major simulators.

/// Difficulty of a single course
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Difficulty {
    Easy,
    Normal,
    Hard,
    Oni,
    Ura,
}

impl Difficulty {
    /// Normalize the `COURSE:` metadata value (name or numeric id)
    pub fn from_value(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "easy" | "0" => Some(Difficulty::Easy),
            "normal" | "1" => Some(Difficulty::Normal),
            "hard" | "2" => Some(Difficulty::Hard),
            "oni" | "3" => Some(Difficulty::Oni),
            "ura" | "edit" | "4" => Some(Difficulty::Ura),
            _ => None,
        }
    }

    /// Filename id used for output `.bin` files (e.g. Oni -> `song_m.bin`)
    pub fn file_id(self) -> char {
        match self {
            Difficulty::Easy => 'e',
            Difficulty::Normal => 'n',
            Difficulty::Hard => 'h',
            Difficulty::Oni => 'm',
            Difficulty::Ura => 'x',
        }
    }

    pub fn index(self) -> u8 {
        match self {
            Difficulty::Easy => 0,
            Difficulty::Normal => 1,
            Difficulty::Hard => 2,
            Difficulty::Oni => 3,
            Difficulty::Ura => 4,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Difficulty::Easy => "Easy",
            Difficulty::Normal => "Normal",
            Difficulty::Hard => "Hard",
            Difficulty::Oni => "Oni",
            Difficulty::Ura => "Ura",
        };
        write!(f, "{name}")
    }
}

/// Single or two-player chart layout
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Style {
    #[default]
    Single,
    Double,
}

/// Which player a `#START Px` body belongs to
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum PlayerSide {
    #[default]
    None,
    P1,
    P2,
}

impl PlayerSide {
    /// `_1`/`_2` suffix for output file names, empty for single player
    pub fn file_suffix(self) -> &'static str {
        match self {
            PlayerSide::None => "",
            PlayerSide::P1 => "_1",
            PlayerSide::P2 => "_2",
        }
    }
}

/// One of the three playable chart paths of a diverge song
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BranchSide {
    Normal,
    Advanced,
    Master,
}

pub const BRANCH_SIDES: [BranchSide; 3] =
    [BranchSide::Normal, BranchSide::Advanced, BranchSide::Master];

impl BranchSide {
    pub fn index(self) -> usize {
        match self {
            BranchSide::Normal => 0,
            BranchSide::Advanced => 1,
            BranchSide::Master => 2,
        }
    }
}

/// Gate thresholds of a `#BRANCHSTART` command
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum BranchCondition {
    /// `p`: percentage accuracy thresholds
    Accuracy { advanced: f64, master: f64 },
    /// `r`: drumroll hit count thresholds
    Drumroll { advanced: i32, master: i32 },
    /// `s`: score thresholds
    Score { advanced: i32, master: i32 },
}

/// Chart command attached to a measure at a 0-based subposition.
///
/// `pos == notes.len()` means "end of measure", before the barline.
#[derive(Debug, Clone, PartialEq)]
pub struct TjaEvent {
    pub pos: i32,
    pub kind: TjaEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TjaEventKind {
    BpmChange(f64),
    TimeSignature(i32, i32),
    Scroll(f64),
    Gogo(bool),
    Barline(bool),
    /// Delay in seconds
    Delay(f64),
    BranchStart(BranchCondition),
    Section,
    LevelHold,
    SenoteChange(u8),
}

/// One bar of music: note symbols plus interleaved commands
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TjaMeasure {
    pub notes: Vec<char>,
    pub events: Vec<TjaEvent>,
}

impl TjaMeasure {
    fn is_empty(&self) -> bool {
        self.notes.is_empty() && self.events.is_empty()
    }
}

/// All the data of a single `COURSE:` body, split per branch.
///
/// Charts without `#BRANCHSTART` only fill the normal stream; the other
/// two streams stay empty and are cloned from normal at compile time.
#[derive(Debug, Clone, PartialEq)]
pub struct TjaCourse {
    pub difficulty: Difficulty,
    pub level: i32,
    pub balloons: Vec<i32>,
    pub score_init: i32,
    pub score_diff: i32,
    pub style: Style,
    pub player: PlayerSide,
    pub has_branches: bool,
    pub branches: [Vec<TjaMeasure>; 3],
}

/// Key of a course within a song: difficulty plus player side
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CourseKey {
    pub difficulty: Difficulty,
    pub player: PlayerSide,
}

impl fmt::Display for CourseKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.player {
            PlayerSide::None => write!(f, "{}", self.difficulty),
            PlayerSide::P1 => write!(f, "{}P1", self.difficulty),
            PlayerSide::P2 => write!(f, "{}P2", self.difficulty),
        }
    }
}

/// All the data of a single `.tja` chart file
#[derive(Debug, Clone, PartialEq)]
pub struct TjaSong {
    pub bpm: f64,
    /// `OFFSET:` metadata in seconds; positive values pull notes earlier
    pub offset: f64,
    pub courses: BTreeMap<CourseKey, TjaCourse>,
}

/// Parse a `.tja` file from disk, logging non-fatal diagnostics.
pub fn parse_tja(path: &Path) -> Result<TjaSong, ConvertError> {
    let bytes = fs::read(path)?;
    let mut warnings = Vec::new();
    let song = parse_tja_data(&bytes, &mut warnings);
    for warning in &warnings {
        log::warn!("{warning}");
    }
    song
}

/// Parse raw `.tja` bytes, collecting non-fatal diagnostics.
pub fn parse_tja_data(
    bytes: &[u8],
    warnings: &mut Vec<ConvertWarning>,
) -> Result<TjaSong, ConvertError> {
    let (text, encoding) = decode_chart_bytes(bytes)?;
    log::info!("decoded chart as {encoding}");
    parse_tja_text(&text, warnings)
}

/// Course-level metadata accumulated in header mode
#[derive(Debug, Clone)]
struct CourseMeta {
    difficulty: Difficulty,
    level: i32,
    balloons: Vec<i32>,
    score_init: i32,
    score_diff: i32,
    style: Style,
}

impl Default for CourseMeta {
    fn default() -> Self {
        CourseMeta {
            difficulty: Difficulty::Oni,
            level: 0,
            balloons: vec![],
            score_init: 0,
            score_diff: 0,
            style: Style::Single,
        }
    }
}

/// Parse decoded TJA text with a single forward scan.
///
/// Two modes: header mode (before any `#START`) handles `KEY:VALUE`
/// metadata; body mode collects chart notation until `#END`.
pub fn parse_tja_text(
    text: &str,
    warnings: &mut Vec<ConvertWarning>,
) -> Result<TjaSong, ConvertError> {
    let lines = chart_lines(text);

    let mut bpm: Option<f64> = None;
    let mut offset: Option<f64> = None;
    let mut meta = CourseMeta::default();
    let mut courses: BTreeMap<CourseKey, TjaCourse> = BTreeMap::new();
    let mut body: Option<BodyParser> = None;

    for (idx, line) in lines.iter().enumerate() {
        if let Some(rest) = line.strip_prefix('#') {
            let (command, value) = split_command(rest);
            match command.as_str() {
                "START" => {
                    if body.is_some() {
                        return Err(ConvertError::ParseError(
                            "nested #START without #END".to_string(),
                        ));
                    }
                    let player = match value.to_ascii_uppercase().as_str() {
                        "" => PlayerSide::None,
                        "P1" => PlayerSide::P1,
                        "P2" => PlayerSide::P2,
                        other => {
                            return Err(ConvertError::ParseError(format!(
                                "invalid #START argument '{other}'"
                            )))
                        }
                    };
                    if bpm.is_none() {
                        return Err(ConvertError::ParseError("missing BPM metadata".to_string()));
                    }
                    if offset.is_none() {
                        return Err(ConvertError::ParseError(
                            "missing OFFSET metadata".to_string(),
                        ));
                    }
                    let key = CourseKey {
                        difficulty: meta.difficulty,
                        player,
                    };
                    if courses.contains_key(&key) {
                        return Err(ConvertError::ParseError(format!(
                            "duplicate chart body for course {key}"
                        )));
                    }
                    let has_branches = lines[idx + 1..]
                        .iter()
                        .take_while(|l| !l.eq_ignore_ascii_case("#END"))
                        .any(|l| l.to_ascii_uppercase().starts_with("#BRANCH"));
                    body = Some(BodyParser::new(key, meta.clone(), has_branches));
                }
                "END" => {
                    let finished = body.take().ok_or_else(|| {
                        ConvertError::ParseError("#END outside of a chart body".to_string())
                    })?;
                    let course = finished.finish()?;
                    courses.insert(CourseKey::from_course(&course), course);
                }
                _ => match body.as_mut() {
                    Some(parser) => {
                        let next_is_branchstart = lines
                            .get(idx + 1)
                            .is_some_and(|l| l.to_ascii_uppercase().starts_with("#BRANCHSTART"));
                        parser.command(&command, value, next_is_branchstart, warnings)?;
                    }
                    None => warnings.push(ConvertWarning::UnknownCommand(command.clone())),
                },
            }
        } else if let Some(parser) = body.as_mut() {
            parser.notes_line(line, warnings);
        } else if let Some((key, value)) = line.split_once(':') {
            parse_metadata(
                &key.trim().to_ascii_uppercase(),
                value.trim(),
                &mut bpm,
                &mut offset,
                &mut meta,
                warnings,
            )?;
        } else {
            log::debug!("ignoring stray line '{line}'");
        }
    }

    if body.is_some() {
        return Err(ConvertError::ParseError(
            "chart body not closed by #END".to_string(),
        ));
    }
    let bpm =
        bpm.ok_or_else(|| ConvertError::ParseError("missing BPM metadata".to_string()))?;
    let offset =
        offset.ok_or_else(|| ConvertError::ParseError("missing OFFSET metadata".to_string()))?;
    Ok(TjaSong {
        bpm,
        offset,
        courses,
    })
}

impl CourseKey {
    fn from_course(course: &TjaCourse) -> Self {
        CourseKey {
            difficulty: course.difficulty,
            player: course.player,
        }
    }
}

/// Split a `#COMMAND value` line into its uppercased command and raw value
fn split_command(rest: &str) -> (String, &str) {
    match rest.split_once(char::is_whitespace) {
        Some((command, value)) => (command.to_ascii_uppercase(), value.trim()),
        None => (rest.to_ascii_uppercase(), ""),
    }
}

fn parse_metadata(
    key: &str,
    value: &str,
    bpm: &mut Option<f64>,
    offset: &mut Option<f64>,
    meta: &mut CourseMeta,
    warnings: &mut Vec<ConvertWarning>,
) -> Result<(), ConvertError> {
    match key {
        "BPM" => {
            let parsed = parse_float("BPM", value)?;
            if parsed <= 0.0 {
                return Err(ConvertError::ParseError(format!(
                    "BPM must be positive, got '{value}'"
                )));
            }
            *bpm = Some(parsed);
        }
        "OFFSET" => *offset = Some(parse_float("OFFSET", value)?),
        "COURSE" => {
            let difficulty = Difficulty::from_value(value).ok_or_else(|| {
                ConvertError::ParseError(format!("invalid COURSE value: '{value}'"))
            })?;
            // A new COURSE block starts with fresh course metadata
            *meta = CourseMeta {
                difficulty,
                ..CourseMeta::default()
            };
        }
        "LEVEL" => {
            let level = parse_int("LEVEL", value)?;
            let clamped = level.clamp(1, 10);
            if clamped != level {
                warnings.push(ConvertWarning::LevelClamped(level, clamped));
            }
            meta.level = clamped;
        }
        "BALLOON" => {
            let mut balloons = vec![];
            for entry in value.split(',') {
                let entry = entry.trim();
                if !entry.is_empty() {
                    balloons.push(parse_int("BALLOON", entry)?);
                }
            }
            meta.balloons = balloons;
        }
        "SCOREINIT" => meta.score_init = parse_score_list("SCOREINIT", value)?,
        "SCOREDIFF" => meta.score_diff = parse_score_list("SCOREDIFF", value)?,
        "STYLE" => match value.to_ascii_lowercase().as_str() {
            "single" | "1" => meta.style = Style::Single,
            "double" | "couple" | "2" => meta.style = Style::Double,
            other => log::debug!("ignoring unknown STYLE '{other}'"),
        },
        _ => {} // TITLE, SUBTITLE, WAVE, etc. are irrelevant for conversion
    }
    Ok(())
}

fn parse_float(name: &str, value: &str) -> Result<f64, ConvertError> {
    value.parse::<f64>().map_err(|_| {
        ConvertError::ParseError(format!("non-numeric {name} value: '{value}'"))
    })
}

fn parse_int(name: &str, value: &str) -> Result<i32, ConvertError> {
    value.parse::<i32>().map_err(|_| {
        ConvertError::ParseError(format!("non-numeric {name} value: '{value}'"))
    })
}

/// `SCOREINIT`/`SCOREDIFF` accept comma lists; the last value wins
fn parse_score_list(name: &str, value: &str) -> Result<i32, ConvertError> {
    match value.split(',').next_back().map(str::trim) {
        None | Some("") => Ok(0),
        Some(last) => parse_int(name, last),
    }
}

/// Where the body parser currently routes notes and events
#[derive(Debug, Copy, Clone, PartialEq)]
enum Route {
    /// Outside branch sections: replicate into every populated stream
    Shared,
    One(BranchSide),
}

/// Incremental parser for a single `#START`..`#END` body.
///
/// Each branch stream always ends with the measure currently being built;
/// `,` closes it and opens the next one.
struct BodyParser {
    key: CourseKey,
    meta: CourseMeta,
    has_branches: bool,
    branches: [Vec<TjaMeasure>; 3],
    route: Route,
    saw_branch_start: bool,
    branch_open: bool,
    last_condition: Option<BranchCondition>,
}

impl BodyParser {
    fn new(key: CourseKey, meta: CourseMeta, has_branches: bool) -> Self {
        BodyParser {
            key,
            meta,
            has_branches,
            branches: [
                vec![TjaMeasure::default()],
                vec![TjaMeasure::default()],
                vec![TjaMeasure::default()],
            ],
            route: Route::Shared,
            saw_branch_start: false,
            branch_open: false,
            last_condition: None,
        }
    }

    /// Branch streams receiving content under the current route
    fn routed(&self) -> &'static [BranchSide] {
        match self.route {
            Route::Shared if self.has_branches => &BRANCH_SIDES,
            Route::Shared => &[BranchSide::Normal],
            Route::One(BranchSide::Normal) => &[BranchSide::Normal],
            Route::One(BranchSide::Advanced) => &[BranchSide::Advanced],
            Route::One(BranchSide::Master) => &[BranchSide::Master],
        }
    }

    fn push_event(&mut self, kind: TjaEventKind) {
        for side in self.routed() {
            let measure = self.branches[side.index()]
                .last_mut()
                .expect("branch stream always ends with an open measure");
            let pos = measure.notes.len() as i32;
            measure.events.push(TjaEvent {
                pos,
                kind: kind.clone(),
            });
        }
    }

    /// Consume a line of note data; `,` terminates measures
    fn notes_line(&mut self, line: &str, warnings: &mut Vec<ConvertWarning>) {
        for c in line.chars() {
            match c {
                ',' => {
                    for side in self.routed() {
                        self.branches[side.index()].push(TjaMeasure::default());
                    }
                }
                '0'..='9' | 'A'..='I' => {
                    for side in self.routed() {
                        let measure = self.branches[side.index()]
                            .last_mut()
                            .expect("branch stream always ends with an open measure");
                        measure.notes.push(c);
                    }
                }
                c if c.is_whitespace() => {}
                other => warnings.push(ConvertWarning::SkippedSymbol(other)),
            }
        }
    }

    /// Handle a `#COMMAND` line inside the body
    fn command(
        &mut self,
        command: &str,
        value: &str,
        next_is_branchstart: bool,
        warnings: &mut Vec<ConvertWarning>,
    ) -> Result<(), ConvertError> {
        match command {
            "BPMCHANGE" => {
                let bpm = parse_float("BPMCHANGE", value)?;
                if bpm <= 0.0 {
                    return Err(ConvertError::ParseError(format!(
                        "BPMCHANGE must be positive, got '{value}'"
                    )));
                }
                self.push_event(TjaEventKind::BpmChange(bpm));
            }
            "MEASURE" => {
                let (num, den) = value.split_once('/').ok_or_else(|| {
                    ConvertError::ParseError(format!("invalid MEASURE value: '{value}'"))
                })?;
                let num = parse_int("MEASURE", num.trim())?;
                let den = parse_int("MEASURE", den.trim())?;
                if num <= 0 || den <= 0 {
                    return Err(ConvertError::ParseError(format!(
                        "MEASURE terms must be positive, got '{value}'"
                    )));
                }
                self.push_event(TjaEventKind::TimeSignature(num, den));
            }
            "SCROLL" => {
                let scroll = parse_float("SCROLL", value)?;
                self.push_event(TjaEventKind::Scroll(scroll));
            }
            "GOGOSTART" => self.push_event(TjaEventKind::Gogo(true)),
            "GOGOEND" => self.push_event(TjaEventKind::Gogo(false)),
            "BARLINEON" => self.push_event(TjaEventKind::Barline(true)),
            "BARLINEOFF" => self.push_event(TjaEventKind::Barline(false)),
            "DELAY" => {
                let delay = parse_float("DELAY", value)?;
                self.push_event(TjaEventKind::Delay(delay));
            }
            "BRANCHSTART" => {
                let condition = parse_branch_condition(value)?;
                self.branch_start(condition)?;
            }
            "N" => self.branch_label(BranchSide::Normal)?,
            "E" => self.branch_label(BranchSide::Advanced)?,
            "M" => self.branch_label(BranchSide::Master)?,
            "BRANCHEND" => {
                if !self.branch_open {
                    return Err(ConvertError::ParseError(
                        "#BRANCHEND without matching #BRANCHSTART".to_string(),
                    ));
                }
                self.check_aligned()?;
                self.branch_open = false;
                self.route = Route::Shared;
            }
            "SECTION" => {
                // A #SECTION directly before #BRANCHSTART applies to every
                // branch; an isolated #SECTION resets the accuracy tally by
                // repeating the previous branch condition.
                if next_is_branchstart {
                    self.route = Route::Shared;
                    self.push_event(TjaEventKind::Section);
                } else if let Some(condition) = self.last_condition {
                    self.push_event(TjaEventKind::Section);
                    self.push_event(TjaEventKind::BranchStart(condition));
                } else {
                    warnings.push(ConvertWarning::SectionWithoutBranch);
                    self.push_event(TjaEventKind::Section);
                }
            }
            "LEVELHOLD" => self.push_event(TjaEventKind::LevelHold),
            "SENOTECHANGE" => {
                let senote = parse_int("SENOTECHANGE", value)?;
                if (0..=5).contains(&senote) {
                    self.push_event(TjaEventKind::SenoteChange(senote as u8));
                } else {
                    warnings.push(ConvertWarning::UnknownCommand(format!(
                        "SENOTECHANGE {senote}"
                    )));
                }
            }
            other => warnings.push(ConvertWarning::UnknownCommand(other.to_string())),
        }
        Ok(())
    }

    fn branch_start(&mut self, condition: BranchCondition) -> Result<(), ConvertError> {
        self.route = Route::Shared;
        self.check_aligned()?;
        self.saw_branch_start = true;
        self.branch_open = true;
        self.last_condition = Some(condition);
        self.push_event(TjaEventKind::BranchStart(condition));
        Ok(())
    }

    fn branch_label(&mut self, side: BranchSide) -> Result<(), ConvertError> {
        if !self.saw_branch_start {
            return Err(ConvertError::ParseError(format!(
                "branch label #{} outside of #BRANCHSTART",
                match side {
                    BranchSide::Normal => "N",
                    BranchSide::Advanced => "E",
                    BranchSide::Master => "M",
                }
            )));
        }
        self.route = Route::One(side);
        Ok(())
    }

    /// All streams must have the same measure count at fork boundaries
    fn check_aligned(&self) -> Result<(), ConvertError> {
        if !self.has_branches {
            return Ok(());
        }
        let [n, a, m] = [
            self.branches[0].len(),
            self.branches[1].len(),
            self.branches[2].len(),
        ];
        if n != a || n != m {
            return Err(ConvertError::ParseError(format!(
                "branches do not have the same number of measures \
                 (normal {n}, advanced {a}, master {m}); check the ',' \
                 count of each branch section"
            )));
        }
        Ok(())
    }

    fn finish(mut self) -> Result<TjaCourse, ConvertError> {
        // Drop the trailing measure of each stream when nothing was added
        // to it (the open measure after the final ',')
        for branch in &mut self.branches {
            if branch.last().is_some_and(TjaMeasure::is_empty) {
                branch.pop();
            }
        }
        if self.has_branches {
            self.check_aligned()?;
        }
        Ok(TjaCourse {
            difficulty: self.key.difficulty,
            level: self.meta.level,
            balloons: self.meta.balloons,
            score_init: self.meta.score_init,
            score_diff: self.meta.score_diff,
            style: self.meta.style,
            player: self.key.player,
            has_branches: self.has_branches,
            branches: self.branches,
        })
    }
}

/// Parse `kind,advanced,master` after `#BRANCHSTART`
fn parse_branch_condition(value: &str) -> Result<BranchCondition, ConvertError> {
    let mut parts = value.split(',').map(str::trim);
    let (kind, advanced, master) = match (parts.next(), parts.next(), parts.next()) {
        (Some(kind), Some(advanced), Some(master)) => (kind, advanced, master),
        _ => {
            return Err(ConvertError::ParseError(format!(
                "invalid #BRANCHSTART value: '{value}'"
            )))
        }
    };
    let advanced_f = parse_float("BRANCHSTART", advanced)?;
    let master_f = parse_float("BRANCHSTART", master)?;
    match kind.to_ascii_lowercase().as_str() {
        "p" => Ok(BranchCondition::Accuracy {
            advanced: advanced_f,
            master: master_f,
        }),
        "r" => Ok(BranchCondition::Drumroll {
            advanced: advanced_f.round() as i32,
            master: master_f.round() as i32,
        }),
        "s" => Ok(BranchCondition::Score {
            advanced: advanced_f.round() as i32,
            master: master_f.round() as i32,
        }),
        other => Err(ConvertError::ParseError(format!(
            "invalid #BRANCHSTART type: '{other}'"
        ))),
    }
}
