use std::env;
use std::fs::metadata;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use pathdex::btree::BTree;
use pathdex::btree::Direction;
use pathdex::btree::PathKey;
use pathdex::btree::TreeError;
use pathdex::btree::DEFAULT_DEGREE;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use strum::EnumString;
use tracing_subscriber::EnvFilter;

mod load;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None, disable_help_subcommand = true)]
struct Cli {
    /// Minimum degree of the tree
    #[arg(short, long, default_value_t = DEFAULT_DEGREE)]
    degree: usize,

    /// Seed the tree from a file of `<key> <path>` lines
    #[arg(short, long)]
    load: Option<PathBuf>,

    #[command(subcommand)]
    parameter: Option<Parameter>,
}

#[derive(Debug, EnumString, Subcommand)]
#[strum(ascii_case_insensitive)]
enum Parameter {
    /// Does the tree contain this key (with any path)
    Contains { key: PathKey },
    /// Clear tree entries
    Clear,
    /// Display entry count
    Count,
    /// Delete this key and path
    Delete { key: PathKey, path: String },
    /// Print entries as JSON lines
    Dump {
        /// Direction (Descending or Ascending)
        direction: Option<Direction>,
    },
    /// List tree entries
    Entries {
        /// Direction (Descending or Ascending)
        direction: Option<Direction>,
    },
    /// Get the path for this key
    Get { key: PathKey },
    /// Display tree height
    Height,
    /// Interactive Help
    Help,
    /// Insert key path pair
    Insert { key: PathKey, path: String },
    /// List tree keys
    Keys {
        /// Direction (Descending or Ascending)
        direction: Option<Direction>,
    },
    /// Print the tree level by level
    Levels,
    /// Does the tree contain this key and path
    Search { key: PathKey, path: String },
    /// Node Utilization
    Utilization,
    /// Verify tree
    Verify,
}

fn get_history_file() -> Option<PathBuf> {
    dirs::preference_dir()
        .and_then(|mut base| {
            base.push("pathdex");
            // Note: Not create_dir_all(), because we don't want to create preference
            // dirs if they don't exist.
            if metadata(base.clone()).ok().is_none() {
                std::fs::create_dir(base.clone()).ok()?
            }
            Some(base)
        })
        .map(|mut base| {
            base.push("history.txt");
            base
        })
}

/// Split a line into at most `count` words. The last word is the trimmed remainder of the line,
/// so paths may contain spaces.
fn split_words(line: &str, count: usize) -> Vec<&str> {
    let mut words = vec![];
    let mut rest = line.trim();
    while !rest.is_empty() {
        if words.len() + 1 == count {
            words.push(rest);
            break;
        }
        match rest.split_once(char::is_whitespace) {
            Some((word, tail)) => {
                words.push(word);
                rest = tail.trim_start();
            }
            None => {
                words.push(rest);
                break;
            }
        }
    }
    words
}

fn parse_key(word: &str) -> Option<PathKey> {
    match PathKey::from_str(word) {
        Ok(key) => Some(key),
        Err(e) => {
            println!("invalid key: {word}: {e}");
            None
        }
    }
}

fn parse_direction(command: &str, words: &[&str]) -> Option<Option<Direction>> {
    match words.len() {
        1 => Some(None),
        2 => {
            // Try to process the parameter
            let direction = Direction::from_str(words[1]).ok();
            if direction.is_none() {
                println!("usage: {command} [<direction>]");
            }
            direction.map(Some)
        }
        _ => {
            println!("usage: {command} [<direction>]");
            None
        }
    }
}

/// Turn an interactive line into a parameter, printing usage when the line doesn't fit.
fn parse_line(line: &str) -> Option<Parameter> {
    let name = *split_words(line, 2).first()?;
    let parameter = match Parameter::from_str(name) {
        Ok(p) => p,
        Err(e) => {
            println!("error: {e}");
            return None;
        }
    };
    // EnumString doesn't deal with variant parameters, so...
    let parameter = match parameter {
        Parameter::Contains { .. } | Parameter::Get { .. } => {
            let words = split_words(line, 2);
            if words.len() != 2 {
                println!("usage: {} <key>", name.to_lowercase());
                return None;
            }
            let key = parse_key(words[1])?;
            if matches!(parameter, Parameter::Contains { .. }) {
                Parameter::Contains { key }
            } else {
                Parameter::Get { key }
            }
        }
        Parameter::Delete { .. } | Parameter::Insert { .. } | Parameter::Search { .. } => {
            let words = split_words(line, 3);
            if words.len() != 3 {
                println!("usage: {} <key> <path>", name.to_lowercase());
                return None;
            }
            let key = parse_key(words[1])?;
            let path = words[2].to_string();
            match parameter {
                Parameter::Delete { .. } => Parameter::Delete { key, path },
                Parameter::Insert { .. } => Parameter::Insert { key, path },
                _ => Parameter::Search { key, path },
            }
        }
        Parameter::Dump { .. } => Parameter::Dump {
            direction: parse_direction("dump", &line.split_whitespace().collect::<Vec<&str>>())?,
        },
        Parameter::Entries { .. } => Parameter::Entries {
            direction: parse_direction(
                "entries",
                &line.split_whitespace().collect::<Vec<&str>>(),
            )?,
        },
        Parameter::Keys { .. } => Parameter::Keys {
            direction: parse_direction("keys", &line.split_whitespace().collect::<Vec<&str>>())?,
        },
        p => p,
    };
    Some(parameter)
}

fn interactive(tree: &mut BTree<PathKey>) -> Result<()> {
    // `()` can be used when no completer is required
    let mut rl = DefaultEditor::new()?;
    if let Some(file_location) = get_history_file() {
        if let Err(e) = rl.load_history(&file_location) {
            println!("error loading history: {e}");
        }
    }
    println!("terminate with ctrl-c or ctrl-d");
    loop {
        let readline = rl.readline("pathdex: ");
        match readline {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                if let Some(parameter) = parse_line(&line) {
                    process_parameter(tree, &parameter);
                }
                rl.add_history_entry(line.as_str())?;
            }
            Err(ReadlineError::Interrupted) => {
                println!("terminating...");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("terminating...");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
    if let Some(file_location) = get_history_file() {
        if let Err(e) = rl.save_history(&file_location) {
            println!("error saving history: {e}");
        }
    }
    Ok(())
}

/// Delete an entry, describing the outcome for the user.
fn delete_message(tree: &mut BTree<PathKey>, key: &PathKey, path: &str) -> String {
    match tree.delete(key, path) {
        Ok(entry) => format!("deleted: {entry}"),
        Err(TreeError::KeyNotFound) => format!("The key {key} does not exist in the tree"),
        Err(TreeError::EmptyTree) => "The tree is empty".to_string(),
        Err(err) => format!("delete failed: {err}"),
    }
}

fn process_parameter(tree: &mut BTree<PathKey>, parameter: &Parameter) {
    match parameter {
        Parameter::Contains { key } => println!("{}", tree.contains_key(key)),
        Parameter::Clear => {
            tree.clear();
            println!("cleared");
        }
        Parameter::Count => println!("count: {}", tree.len()),
        Parameter::Delete { key, path } => println!("{}", delete_message(tree, key, path)),
        Parameter::Dump { direction } => {
            for entry in tree.entries(direction.unwrap_or(Direction::Ascending)) {
                match serde_json::to_string(entry) {
                    Ok(json) => println!("{json}"),
                    Err(e) => {
                        println!("error: {e}");
                        break;
                    }
                }
            }
        }
        Parameter::Entries { direction } => {
            tree.print_entries(direction.unwrap_or(Direction::Ascending))
        }
        Parameter::Get { key } => match tree.get(key) {
            Some(path) => println!("{path}"),
            None => println!("not found"),
        },
        Parameter::Height => println!("height: {}", tree.height()),
        Parameter::Help => {
            let help = Cli::command().render_help().to_string();

            let mut print_it = false;

            for line in help.lines() {
                if line.starts_with("Options:") {
                    print_it = false;
                }
                if print_it && !line.is_empty() {
                    println!("{}", line);
                }
                if line.starts_with("Commands:") {
                    print_it = true;
                }
            }
        }
        Parameter::Insert { key, path } => {
            tree.insert(key.clone(), path.clone());
            println!("inserted: {key}:{path}");
        }
        Parameter::Keys { direction } => tree.print_keys(direction.unwrap_or(Direction::Ascending)),
        Parameter::Levels => {
            if tree.is_empty() {
                println!("The tree is empty");
            } else {
                println!("{tree}");
            }
        }
        Parameter::Search { key, path } => println!("{}", tree.search(key, path)),
        Parameter::Utilization => {
            println!("Utilization: {:.1}%", 100.0 * tree.utilization());
        }
        Parameter::Verify => match tree.verify() {
            Ok(_) => println!("Ok"),
            Err(e) => println!("Verification failed: {e}"),
        },
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_dir = match env::var("TMPDIR") {
        Ok(d) => d,
        Err(_e) => ".".to_string(),
    };

    let file_appender = tracing_appender::rolling::daily(log_dir, "pathdex.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(non_blocking)
        .init();

    let mut tree = BTree::<PathKey>::try_new(cli.degree)?;
    if let Some(location) = &cli.load {
        let loaded = load::load_file(&mut tree, location)?;
        println!("loaded: {loaded}");
    }
    tree.info();

    match cli.parameter {
        Some(parameter) => process_parameter(&mut tree, &parameter),
        None => interactive(&mut tree)?,
    }
    Ok(())
}
