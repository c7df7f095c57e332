use wasm_bindgen::prelude::*;

use emu_core::{BANNER, run_sources, status_line};

/// Run a whole session over in-memory inputs and return what a terminal
/// would show. Load and parse errors come back as text rather than throwing.
#[wasm_bindgen]
pub fn run_session(vfs_csv: &str, script: &str) -> String {
    let mut screen = String::from(BANNER.trim_start());
    match run_sources("vfs.csv", vfs_csv.as_bytes(), script, "$ ") {
        Ok(outcome) => {
            for line in &outcome.transcript {
                screen.push_str(line);
                screen.push('\n');
            }
            screen.push_str(&status_line(&outcome.result));
        }
        Err(err) => screen.push_str(&format!("error: {}", err)),
    }
    screen.push('\n');
    screen
}

#[cfg(test)]
mod tests {
    use super::run_session;

    #[test]
    fn renders_transcript_and_status() {
        let screen = run_session("path,type,content\n/motd,file,hi\n", "read /motd\n");
        assert!(screen.contains("$ read /motd\nhi\n[script] ok:"), "{screen}");
    }

    #[test]
    fn renders_load_errors() {
        let screen = run_session("path,type\n/x,socket\n", "pwd\n");
        assert!(screen.contains("error: CSV line 2: unknown type `socket`"), "{screen}");
    }
}
