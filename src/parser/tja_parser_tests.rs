use crate::parser::tja_parser::*;
use crate::{ConvertError, ConvertWarning};

fn parse(text: &str) -> TjaSong {
    let mut warnings = vec![];
    parse_tja_text(text, &mut warnings)
        .unwrap_or_else(|err| panic!("failed to parse chart:\n{text}\n{err}"))
}

fn parse_err(text: &str) -> ConvertError {
    let mut warnings = vec![];
    parse_tja_text(text, &mut warnings).expect_err("chart should be rejected")
}

#[test]
fn parse_minimal_song() {
    let song = parse("BPM:120\nOFFSET:0\nCOURSE:Oni\n#START\n1010,\n#END\n");
    assert_eq!(song.bpm, 120.0);
    assert_eq!(song.offset, 0.0);
    assert_eq!(song.courses.len(), 1);

    let course = &song.courses[&CourseKey {
        difficulty: Difficulty::Oni,
        player: PlayerSide::None,
    }];
    assert_eq!(course.difficulty, Difficulty::Oni);
    assert_eq!(course.style, Style::Single);
    assert!(!course.has_branches);
    let normal = &course.branches[0];
    assert_eq!(normal.len(), 1);
    assert_eq!(normal[0].notes, vec!['1', '0', '1', '0']);
    // non-branching charts leave the other streams empty
    assert!(course.branches[1].is_empty());
    assert!(course.branches[2].is_empty());
}

#[test]
fn parse_metadata_is_case_insensitive() {
    let song = parse("bpm:180.5\noffset:-1.25\ncourse:hard\nlevel:8\n#START\n1,\n#END\n");
    assert_eq!(song.bpm, 180.5);
    assert_eq!(song.offset, -1.25);
    let course = song.courses.values().next().unwrap();
    assert_eq!(course.difficulty, Difficulty::Hard);
    assert_eq!(course.level, 8);
}

#[test]
fn parse_numeric_course_names() {
    let song = parse("BPM:120\nOFFSET:0\nCOURSE:2\n#START\n1,\n#END\n");
    let course = song.courses.values().next().unwrap();
    assert_eq!(course.difficulty, Difficulty::Hard);
}

#[test]
fn parse_comments_and_whitespace() {
    let song = parse(
        "BPM:120 // song bpm\nOFFSET:0\n\n  COURSE:Oni  \n#START\n10, // first bar\n#END\n",
    );
    let course = song.courses.values().next().unwrap();
    assert_eq!(course.branches[0][0].notes, vec!['1', '0']);
}

#[test]
fn parse_events_carry_positions() {
    let song = parse(
        "BPM:120\nOFFSET:0\nCOURSE:Oni\n#START\n#GOGOSTART\n11\n#SCROLL 2\n11,\n#GOGOEND\n#END\n",
    );
    let course = song.courses.values().next().unwrap();
    let normal = &course.branches[0];
    assert_eq!(normal.len(), 2, "trailing events open a final empty measure");

    let events = &normal[0].events;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].pos, 0);
    assert_eq!(events[0].kind, TjaEventKind::Gogo(true));
    assert_eq!(events[1].pos, 2);
    assert_eq!(events[1].kind, TjaEventKind::Scroll(2.0));

    // the #GOGOEND after the ',' lands on the next (empty) measure
    assert_eq!(normal[1].events[0].pos, 0);
    assert_eq!(normal[1].events[0].kind, TjaEventKind::Gogo(false));
}

#[test]
fn parse_empty_measures() {
    let song = parse("BPM:120\nOFFSET:0\nCOURSE:Oni\n#START\n1,\n,\n1,\n#END\n");
    let course = song.courses.values().next().unwrap();
    let normal = &course.branches[0];
    assert_eq!(normal.len(), 3);
    assert!(normal[1].notes.is_empty());
}

#[test]
fn parse_balloon_and_score_lists() {
    let song = parse(
        "BPM:120\nOFFSET:0\nCOURSE:Oni\nBALLOON:5,10,20\nSCOREINIT:300,400\nSCOREDIFF:100\n\
         #START\n7008,\n#END\n",
    );
    let course = song.courses.values().next().unwrap();
    assert_eq!(course.balloons, vec![5, 10, 20]);
    assert_eq!(course.score_init, 400, "last SCOREINIT value wins");
    assert_eq!(course.score_diff, 100);
}

#[test]
fn parse_empty_balloon_list() {
    let song = parse("BPM:120\nOFFSET:0\nCOURSE:Oni\nBALLOON:\n#START\n1,\n#END\n");
    let course = song.courses.values().next().unwrap();
    assert!(course.balloons.is_empty());
}

#[test]
fn parse_level_out_of_range_is_clamped() {
    let mut warnings = vec![];
    let song = parse_tja_text(
        "BPM:120\nOFFSET:0\nCOURSE:Oni\nLEVEL:12\n#START\n1,\n#END\n",
        &mut warnings,
    )
    .unwrap();
    let course = song.courses.values().next().unwrap();
    assert_eq!(course.level, 10);
    assert!(warnings.contains(&ConvertWarning::LevelClamped(12, 10)));
}

#[test]
fn parse_double_style_charts() {
    let song = parse(
        "BPM:120\nOFFSET:0\nCOURSE:Oni\nSTYLE:Double\n\
         #START P1\n1,\n#END\n#START P2\n2,\n#END\n",
    );
    assert_eq!(song.courses.len(), 2);
    let p1 = &song.courses[&CourseKey {
        difficulty: Difficulty::Oni,
        player: PlayerSide::P1,
    }];
    let p2 = &song.courses[&CourseKey {
        difficulty: Difficulty::Oni,
        player: PlayerSide::P2,
    }];
    assert_eq!(p1.style, Style::Double);
    assert_eq!(p2.style, Style::Double);
    assert_eq!(p1.branches[0][0].notes, vec!['1']);
    assert_eq!(p2.branches[0][0].notes, vec!['2']);
}

#[test]
fn parse_multiple_courses() {
    let song = parse(
        "BPM:120\nOFFSET:0\n\
         COURSE:Oni\nLEVEL:9\n#START\n1,\n#END\n\
         COURSE:Hard\nLEVEL:7\n#START\n2,\n#END\n",
    );
    assert_eq!(song.courses.len(), 2);
    let keys: Vec<String> = song.courses.keys().map(|k| k.to_string()).collect();
    assert_eq!(keys, vec!["Hard", "Oni"], "courses iterate in difficulty order");
}

#[test]
fn parse_course_metadata_resets_between_courses() {
    let song = parse(
        "BPM:120\nOFFSET:0\n\
         COURSE:Oni\nLEVEL:9\nBALLOON:42\n#START\n1,\n#END\n\
         COURSE:Hard\n#START\n2,\n#END\n",
    );
    let hard = &song.courses[&CourseKey {
        difficulty: Difficulty::Hard,
        player: PlayerSide::None,
    }];
    assert_eq!(hard.level, 0);
    assert!(hard.balloons.is_empty());
}

#[test]
fn parse_branch_sections() {
    let song = parse(
        "BPM:120\nOFFSET:0\nCOURSE:Oni\n#START\n1010,\n\
         #BRANCHSTART r,1,2\n#N\n1,\n#E\n2,\n#M\n3,\n#BRANCHEND\n1111,\n#END\n",
    );
    let course = song.courses.values().next().unwrap();
    assert!(course.has_branches);
    for branch in &course.branches {
        assert_eq!(branch.len(), 3);
        // shared measures are replicated into all branches
        assert_eq!(branch[0].notes, vec!['1', '0', '1', '0']);
        assert_eq!(branch[2].notes, vec!['1', '1', '1', '1']);
    }
    assert_eq!(course.branches[0][1].notes, vec!['1']);
    assert_eq!(course.branches[1][1].notes, vec!['2']);
    assert_eq!(course.branches[2][1].notes, vec!['3']);
    assert!(matches!(
        course.branches[0][1].events[0].kind,
        TjaEventKind::BranchStart(BranchCondition::Drumroll {
            advanced: 1,
            master: 2
        })
    ));
}

#[test]
fn parse_branch_kinds() {
    for (value, expected) in [
        (
            "p,50,80",
            BranchCondition::Accuracy {
                advanced: 50.0,
                master: 80.0,
            },
        ),
        (
            "r,3,6",
            BranchCondition::Drumroll {
                advanced: 3,
                master: 6,
            },
        ),
        (
            "s,1000,2000",
            BranchCondition::Score {
                advanced: 1000,
                master: 2000,
            },
        ),
    ] {
        let text = format!(
            "BPM:120\nOFFSET:0\nCOURSE:Oni\n#START\n1,\n\
             #BRANCHSTART {value}\n#N\n1,\n#E\n1,\n#M\n1,\n#BRANCHEND\n#END\n"
        );
        let song = parse(&text);
        let course = song.courses.values().next().unwrap();
        let found = course.branches[0][1]
            .events
            .iter()
            .find_map(|e| match e.kind {
                TjaEventKind::BranchStart(condition) => Some(condition),
                _ => None,
            })
            .expect("branch condition event");
        assert_eq!(found, expected);
    }
}

#[test]
fn parse_unknown_commands_warn() {
    let mut warnings = vec![];
    parse_tja_text(
        "BPM:120\nOFFSET:0\nCOURSE:Oni\n#START\n#LYRIC hello\n1,\n#END\n",
        &mut warnings,
    )
    .unwrap();
    assert!(warnings.contains(&ConvertWarning::UnknownCommand("LYRIC".to_string())));
}

#[test]
fn reject_nested_start() {
    let err = parse_err("BPM:120\nOFFSET:0\n#START\n#START\n#END\n");
    assert!(matches!(err, ConvertError::ParseError(_)));
}

#[test]
fn reject_end_outside_body() {
    let err = parse_err("BPM:120\nOFFSET:0\n#END\n");
    assert!(matches!(err, ConvertError::ParseError(_)));
}

#[test]
fn reject_unclosed_body() {
    let err = parse_err("BPM:120\nOFFSET:0\n#START\n1,\n");
    assert!(matches!(err, ConvertError::ParseError(_)));
}

#[test]
fn reject_branchend_without_branchstart() {
    let err = parse_err("BPM:120\nOFFSET:0\n#START\n1,\n#BRANCHEND\n#END\n");
    assert!(matches!(err, ConvertError::ParseError(_)));
}

#[test]
fn reject_missing_bpm() {
    let err = parse_err("OFFSET:0\n#START\n1,\n#END\n");
    assert!(matches!(err, ConvertError::ParseError(_)));
}

#[test]
fn reject_non_numeric_offset() {
    let err = parse_err("BPM:120\nOFFSET:abc\n#START\n1,\n#END\n");
    assert!(matches!(err, ConvertError::ParseError(_)));
}

#[test]
fn reject_invalid_course() {
    let err = parse_err("BPM:120\nOFFSET:0\nCOURSE:Tatsujin\n#START\n1,\n#END\n");
    assert!(matches!(err, ConvertError::ParseError(_)));
}

#[test]
fn reject_duplicate_course_body() {
    let err = parse_err(
        "BPM:120\nOFFSET:0\nCOURSE:Oni\n#START\n1,\n#END\n#START\n2,\n#END\n",
    );
    assert!(matches!(err, ConvertError::ParseError(_)));
}

#[test]
fn reject_unbalanced_branches() {
    let err = parse_err(
        "BPM:120\nOFFSET:0\n#START\n1,\n\
         #BRANCHSTART p,50,80\n#N\n1,\n1,\n#E\n2,\n#M\n3,\n#BRANCHEND\n#END\n",
    );
    assert!(matches!(err, ConvertError::ParseError(_)));
}

#[test]
fn parse_senotechange_event() {
    let song = parse("BPM:120\nOFFSET:0\nCOURSE:Oni\n#START\n#SENOTECHANGE 2\n1,\n#END\n");
    let course = song.courses.values().next().unwrap();
    assert_eq!(
        course.branches[0][0].events[0].kind,
        TjaEventKind::SenoteChange(2)
    );
}

#[test]
fn parse_section_before_branchstart_lands_on_all_branches() {
    let song = parse(
        "BPM:120\nOFFSET:0\nCOURSE:Oni\n#START\n1,\n\
         #BRANCHSTART p,50,80\n#N\n1,\n#E\n1,\n#M\n1,\n\
         #SECTION\n#BRANCHSTART p,60,90\n#N\n1,\n#E\n1,\n#M\n1,\n#BRANCHEND\n#END\n",
    );
    let course = song.courses.values().next().unwrap();
    for branch in &course.branches {
        let has_section = branch
            .iter()
            .flat_map(|m| &m.events)
            .any(|e| e.kind == TjaEventKind::Section);
        assert!(has_section, "every branch must carry the #SECTION event");
    }
}

#[test]
fn parse_isolated_section_repeats_branch_condition() {
    let song = parse(
        "BPM:120\nOFFSET:0\nCOURSE:Oni\n#START\n1,\n\
         #BRANCHSTART p,50,80\n#N\n1,\n#E\n1,\n#M\n1,\n#BRANCHEND\n\
         #SECTION\n1,\n#END\n",
    );
    let course = song.courses.values().next().unwrap();
    let repeated = course.branches[0]
        .iter()
        .flat_map(|m| &m.events)
        .filter(|e| matches!(e.kind, TjaEventKind::BranchStart(_)))
        .count();
    assert_eq!(repeated, 2, "#SECTION repeats the previous condition");
}
