//! Interactive demo REPL for lineread.
//!
//! Reads lines in a loop and echoes them back. Completion offers a few
//! fixed command names plus filenames, history persists next to the
//! working directory, and Enter only submits once braces are balanced.

use std::path::PathBuf;

use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use lineread::{complete_word, Color, CompletionEnv, LineReader};

const COMMANDS: &[&str] = &["help", "history", "hello world", "exit", "example"];

fn complete_command(env: &mut CompletionEnv, prefix: &str) {
    let mut inner = |env: &mut CompletionEnv, word: &str| {
        for cmd in COMMANDS {
            if cmd.starts_with(word) {
                if !env.add_completion(cmd, cmd) {
                    return;
                }
            }
        }
    };
    complete_word(env, prefix, &mut inner);
}

/// Submit only once every '{' has a matching '}'.
fn braces_balanced(text: &str) -> bool {
    let mut depth = 0i32;
    for c in text.chars() {
        match c {
            '{' => depth += 1,
            '}' => depth -= 1,
            _ => {}
        }
    }
    depth <= 0
}

fn init_logging() {
    let Ok(log_file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open("lineread-demo.log")
    else {
        return;
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn main() -> anyhow::Result<()> {
    init_logging();
    info!("demo starting");

    let mut reader = LineReader::new();
    reader.set_history(Some(PathBuf::from("lineread-demo-history.txt")), -1);
    reader.set_prompt_marker("» ");
    reader.set_prompt_color(Color::BrightGreen);
    reader.set_default_completer(complete_command, None);
    reader.set_input_complete_hook(braces_balanced);

    println!("lineread demo. Tab completes, Ctrl-R searches history,");
    println!("Alt-Enter for a new line, Ctrl-D on an empty line exits.");

    while let Some(line) = reader.read_line("demo") {
        if line == "exit" {
            break;
        }
        if line == "history" {
            println!("(history is in lineread-demo-history.txt)");
            continue;
        }
        println!("you typed: {:?}", line);
    }

    info!("demo exiting");
    Ok(())
}
