/// Test helpers: synthetic ABC transcripts and a fake ABC executable.
use crate::config::{PathsConfig, ToolConfig};
use crate::sweep::SweepSettings;
use std::path::Path;
use std::time::Duration;

pub const BANNER_LINE: &str = "UC Berkeley, ABC 1.01 (compiled Jan  1 2024 00:00:00)";

/// Render a transcript the way ABC prints it in batch mode: banner, then
/// `abc NN> <instruction>` followed by its output, then one trailing prompt.
pub fn abc_transcript(commands: &[(&str, &[&str])]) -> String {
    let mut out = format!("{BANNER_LINE}\n");
    for (i, (command, lines)) in commands.iter().enumerate() {
        out.push_str(&format!("abc {:02}> {command}\n", i + 1));
        for line in *lines {
            out.push_str(line);
            out.push('\n');
        }
    }
    out.push_str(&format!("abc {:02}> ", commands.len() + 1));
    out
}

/// Shell emulation of the ABC commands the sweeps issue. Reads instructions
/// from stdin, echoes each after a numbered prompt, and prints canned output.
///
/// Behaviour switches:
/// - a script mentioning `garbled` makes the tool crash before its banner,
/// - `netgen multiplier 3` and any `symmetrize` carrying `SLOW` sleep for
///   30 seconds, as does an `aig` symmetrization carrying `slow-aig`,
/// - a script mentioning `noerror` gets a `symmetrize` report without a
///   usable total error,
/// - `write` and `gbdd_store` create their target files.
const FAKE_ABC: &str = r#"#!/bin/sh
script=$(cat)
case "$script" in
  *garbled*) echo "segmentation fault"; exit 139 ;;
esac
echo "UC Berkeley, ABC 1.01 (compiled Jan  1 2024 00:00:00)"
printf '%s\n' "$script" | {
n=1
while IFS= read -r line; do
  printf 'abc %02d> %s\n' "$n" "$line"
  case "$line" in
    time)
      echo "elapse: 0.25 seconds, total: 0.50 seconds" ;;
    "netgen multiplier 3")
      sleep 30 ;;
    gbdd_build*)
      echo "Global BDDs built successfully."
      echo "Node count: 42" ;;
    print_stats)
      echo "net                           : i/o =   32/   17  lat =    0  and =    123  lev = 17" ;;
    print_io)
      echo "Primary inputs (32): a0 a1"
      echo "Primary outputs (17): s0 s1" ;;
    "write "*)
      : > "${line#write }" ;;
    "gbdd_store "*)
      : > "${line#gbdd_store }" ;;
    symmetrize*)
      case "$line" in
        *SLOW*) sleep 30 ;;
        *' aig "slow-aig"'*) sleep 30 ;;
      esac
      echo "t_symm =     0.01 sec"
      echo "Did 2 loops total"
      echo "t_aig =     0.20 sec"
      echo "t_bdd =     0.03 sec"
      echo "t_select =     0.04 sec"
      echo "Symmetrization complete."
      echo "AIG size: 120 -> 95 (-20.83%)"
      echo "BDD size: 80 -> 80 (0.00%)"
      echo "Selection: 0110 (50.00% of components)"
      case "$script" in
        *noerror*) echo "Total error: unavailable" ;;
        *) echo "Total error: 0.12" ;;
      esac ;;
  esac
  n=$((n+1))
done
printf 'abc %02d> ' "$n"
}
"#;

/// Write the fake tool into `dir` and return a tool config that runs it there.
pub fn fake_abc(dir: &Path) -> ToolConfig {
    let path = dir.join("fake-abc.sh");
    std::fs::write(&path, FAKE_ABC).unwrap();
    ToolConfig {
        command: "sh".to_string(),
        args: vec![path.to_string_lossy().to_string()],
        working_dir: dir.to_path_buf(),
        rc_file: "abc.rc".to_string(),
        ..Default::default()
    }
}

/// Settings running the fake tool with all benchmark directories under `dir`.
pub fn test_settings(dir: &Path, timeout: Duration) -> SweepSettings {
    SweepSettings {
        tool: fake_abc(dir),
        paths: PathsConfig {
            networks_dir: dir.join("benchmark/networks"),
            preprocessed_dir: dir.join("benchmark/preprocessed"),
            compwise_dir: dir.join("benchmark/compwise"),
        },
        timeout,
        optimize_command: "runsc resyn2".to_string(),
        unbounded_error_bound: "100".to_string(),
        verbosity: 0,
    }
}
