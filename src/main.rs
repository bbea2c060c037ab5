use std::path::{Path, PathBuf};

use clap::Parser;

use tja2fumen::{convert_tja_to_fumen, parse_tja, write_fumen, CourseKey};

const EXIT_USAGE: i32 = 1;
const EXIT_PARSE: i32 = 2;
const EXIT_WRITE: i32 = 3;

#[derive(Parser, Debug)]
#[command(version, about = "Convert Taiko no Tatsujin TJA charts to fumen .bin files", long_about = None)]
struct CliArgs {
    /// Path to a .tja chart file. One .bin file per course is written
    /// next to the input.
    file: String,
}

fn main() {
    // setup logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("tja2fumen=info"))
        .init();

    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            let code = match err.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => 0,
                _ => EXIT_USAGE,
            };
            std::process::exit(code);
        }
    };

    let result = main_result(&args);
    std::process::exit(match result {
        Ok(()) => 0,
        Err((code, err)) => {
            // use Display instead of Debug for user friendly error messages
            log::error!("{err}");
            code
        }
    });
}

fn main_result(args: &CliArgs) -> Result<(), (i32, String)> {
    let input = PathBuf::from(&args.file);
    let is_tja = input
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("tja"));
    if !is_tja {
        return Err((
            EXIT_USAGE,
            format!("expected a .tja input file, got '{}'", input.display()),
        ));
    }

    let song = parse_tja(&input).map_err(|err| (EXIT_PARSE, err.to_string()))?;
    if song.courses.is_empty() {
        log::warn!("no chart bodies found in '{}'", input.display());
    }

    let converted = convert_tja_to_fumen(&song).map_err(|err| (EXIT_PARSE, err.to_string()))?;
    for (key, course) in &converted {
        let out = output_path(&input, key);
        log::info!("course {key} -> {}", out.display());
        write_fumen(&out, course).map_err(|err| (EXIT_WRITE, err.to_string()))?;
    }
    Ok(())
}

/// Sibling output file `<stem>_<difficulty id>[_1|_2].bin`
fn output_path(input: &Path, key: &CourseKey) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("chart");
    let name = format!(
        "{stem}_{}{}.bin",
        key.difficulty.file_id(),
        key.player.file_suffix()
    );
    input.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tja2fumen::{Difficulty, PlayerSide};

    #[test]
    fn test_output_path_naming() {
        let input = Path::new("/charts/natsu.tja");
        let oni = CourseKey {
            difficulty: Difficulty::Oni,
            player: PlayerSide::None,
        };
        let p2 = CourseKey {
            difficulty: Difficulty::Ura,
            player: PlayerSide::P2,
        };
        assert_eq!(output_path(input, &oni), Path::new("/charts/natsu_m.bin"));
        assert_eq!(output_path(input, &p2), Path::new("/charts/natsu_x_2.bin"));
    }
}
