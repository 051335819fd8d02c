//! Interactive dispatcher REPL.

use crate::commands::format_marking;
use crate::config::{Config, StorageBackend};
use colored::Colorize;
use petrinet_core::{Dispatcher, MemoryAdapter, PersistenceAdapter, PetriNet};
use petrinet_storage::FileAdapter;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;

const HELP_TEXT: &str = r#"
Available commands:
  help                            Show this help
  net                             Show places and transitions

  create <instance_id> [version]  Create (or reset) an instance
  fire <instance_id> <transition> Fire a transition on an instance
  inspect <instance_id>           Show instance state
  enabled <instance_id>           List transitions enabled for an instance

  quit, exit                      Exit the REPL
"#;

type BoxedDispatcher = Dispatcher<Box<dyn PersistenceAdapter>>;

/// Builds a dispatcher over the configured storage backend.
fn open_dispatcher(
    net: PetriNet,
    config: &Config,
) -> Result<BoxedDispatcher, Box<dyn std::error::Error>> {
    let adapter: Box<dyn PersistenceAdapter> = match config.storage.backend {
        StorageBackend::Memory => Box::new(MemoryAdapter::new()),
        StorageBackend::File => Box::new(FileAdapter::open(config.storage.instances_dir())?),
    };
    Ok(Dispatcher::new(net, adapter))
}

pub fn run(net: PetriNet, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "petrinet REPL".bold().cyan());
    println!(
        "Net {} ({} places, {} transitions), {:?} storage",
        net.checksum().cyan(),
        net.place_count(),
        net.transitions().len(),
        config.storage.backend
    );

    let dispatcher = open_dispatcher(net, config)?;

    let rl_config = rustyline::Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(rl_config)?;

    let history_path = std::env::var("HOME")
        .map(|h| std::path::PathBuf::from(h).join(".petrinet_history"))
        .unwrap_or_else(|_| ".petrinet_history".into());
    let _ = rl.load_history(&history_path);

    println!("Type 'help' for available commands.\n");

    loop {
        let prompt = format!("{} ", "petrinet>".cyan());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match execute_repl_command(&dispatcher, line) {
                    Ok(Some(output)) => println!("{}\n", output),
                    Ok(None) => break,
                    Err(e) => println!("{}: {}\n", "Error".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);
    Ok(())
}

/// Runs one REPL line. Returns `Ok(None)` when the session should end.
fn execute_repl_command<A: PersistenceAdapter>(
    dispatcher: &Dispatcher<A>,
    line: &str,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.is_empty() {
        return Ok(Some(String::new()));
    }

    let cmd = parts[0].to_lowercase();
    let args = &parts[1..];
    let net = dispatcher.net();

    match cmd.as_str() {
        "help" | "?" => Ok(Some(HELP_TEXT.to_string())),

        "quit" | "exit" | "q" => Ok(None),

        "net" => {
            let mut output = format!("{}\n", "Places:".bold());
            output.push_str(&format!(
                "  {}\n",
                format_marking(&net.marking_to_map(net.initial_marking()))
            ));
            output.push_str(&format!("{}\n", "Transitions:".bold()));
            for t in net.transitions() {
                let names = |ids: &[petrinet_core::PlaceId]| {
                    ids.iter()
                        .filter_map(|&p| net.place_name(p))
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                output.push_str(&format!(
                    "  {} [{}] -> [{}]\n",
                    t.name().cyan(),
                    names(t.inputs()),
                    names(t.outputs())
                ));
            }
            Ok(Some(output.trim_end().to_string()))
        }

        "create" | "c" => {
            if args.is_empty() {
                return Ok(Some("Usage: create <instance_id> [version]".to_string()));
            }
            let marking = dispatcher.create(args[0], args.get(1).copied())?;
            Ok(Some(format!(
                "{} {}\n  {}",
                "Created".green(),
                args[0].cyan(),
                format_marking(&net.marking_to_map(&marking))
            )))
        }

        "fire" | "f" => {
            if args.len() < 2 {
                return Ok(Some("Usage: fire <instance_id> <transition>".to_string()));
            }
            let marking = dispatcher.dispatch(args[0], args[1])?;
            Ok(Some(format!(
                "{} {} on {}\n  {}",
                "Fired".green(),
                args[1].cyan(),
                args[0],
                format_marking(&net.marking_to_map(&marking))
            )))
        }

        "inspect" | "i" => {
            if args.is_empty() {
                return Ok(Some("Usage: inspect <instance_id>".to_string()));
            }
            let state = dispatcher.inspect(args[0])?;
            let mut output = format!(
                "{} {}\n  {}\n  fired: {}",
                "Instance".bold(),
                args[0].cyan(),
                format_marking(&state.marking),
                state.transitions_fired
            );
            if let Some(version) = &state.version {
                output.push_str(&format!("\n  version: {}", version));
            }
            Ok(Some(output))
        }

        "enabled" | "e" => {
            if args.is_empty() {
                return Ok(Some("Usage: enabled <instance_id>".to_string()));
            }
            let enabled = dispatcher.enabled(args[0])?;
            if enabled.is_empty() {
                Ok(Some("No transitions enabled".yellow().to_string()))
            } else {
                Ok(Some(enabled.join(", ")))
            }
        }

        _ => Ok(Some(format!(
            "Unknown command: {}. Type 'help' for available commands.",
            cmd
        ))),
    }
}
