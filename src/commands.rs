//! One-shot command execution.

use crate::config::{Config, OutputFormat};
use crate::Commands;
use colored::Colorize;
use petrinet_core::{
    analyse, to_dot, AnalyseOptions, AnalysisReport, InvariantWeights, PetriNet,
    StateSpaceExplorer,
};
use std::collections::BTreeMap;
use std::path::Path;

/// Executes a command and returns the formatted output.
///
/// `repl` runs interactively until the user quits and returns no output.
pub fn execute(cmd: Commands, config: &Config) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Repl { net } => {
            let net = load_net(&net)?;
            crate::repl::run(net, config)?;
            Ok(String::new())
        }

        Commands::Analyse {
            net,
            dot,
            invariants,
            max_states,
            json,
        } => {
            let net = load_net(&net)?;

            let mut options = AnalyseOptions::new()
                .with_explorer(explorer_settings(config, max_states).explorer_config());
            if dot {
                options = options.with_dot();
            }
            for arg in &invariants {
                let weights: InvariantWeights = serde_json::from_value(parse_json_arg(arg)?)?;
                options = options.with_invariant(weights);
            }

            let report = analyse(&net, &options)?;
            if json || config.output.format == OutputFormat::Json {
                Ok(serde_json::to_string_pretty(&report)?)
            } else {
                Ok(format_report(&report))
            }
        }

        Commands::Dot { net, marking } => {
            let net = load_net(&net)?;
            match marking {
                Some(arg) => {
                    let map: BTreeMap<String, u64> = serde_json::from_value(parse_json_arg(&arg)?)?;
                    let marking = net.marking_from_map(&map)?;
                    Ok(to_dot(&net, Some(&marking)))
                }
                None => Ok(to_dot(&net, None)),
            }
        }

        Commands::Reachable {
            net,
            max_states,
            trace,
            json,
        } => {
            let net = load_net(&net)?;
            let set = StateSpaceExplorer::new(&net)
                .with_config(explorer_settings(config, max_states).explorer_config())
                .explore()?;

            if json || config.output.format == OutputFormat::Json {
                let markings: Vec<_> = set.iter().map(|m| net.marking_to_map(m)).collect();
                return Ok(serde_json::to_string_pretty(&markings)?);
            }

            let mut output = format!(
                "{} reachable states, {} edges\n",
                set.len().to_string().bold(),
                set.edge_count()
            );
            for (i, marking) in set.iter().enumerate() {
                output.push_str(&format!(
                    "  {:>4}  {}\n",
                    i,
                    format_marking(&net.marking_to_map(marking))
                ));
                if trace {
                    let steps = set.trace_names(&net, marking).unwrap_or_default();
                    if !steps.is_empty() {
                        output.push_str(&format!("        {}\n", steps.join(" -> ").dimmed()));
                    }
                }
            }
            Ok(output.trim_end().to_string())
        }
    }
}

/// Applies a command-line `--max-states` over the configured cap.
fn explorer_settings(
    config: &Config,
    max_states: Option<usize>,
) -> crate::config::ExplorerSettings {
    let mut settings = config.explorer.clone();
    if let Some(n) = max_states {
        settings.max_states = n;
    }
    settings
}

/// Loads a net definition. `.yaml`/`.yml` files are read as YAML, anything
/// else as JSON.
pub fn load_net(path: &Path) -> Result<PetriNet, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read net '{}': {}", path.display(), e))?;

    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
        .unwrap_or(false);

    let net = if is_yaml {
        PetriNet::from_yaml_str(&content)?
    } else {
        PetriNet::from_json_str(&content)?
    };

    tracing::debug!(
        "Loaded net from {} ({} places, {} transitions, checksum {})",
        path.display(),
        net.place_count(),
        net.transitions().len(),
        net.checksum()
    );

    Ok(net)
}

/// Formats an analysis report for the terminal.
pub fn format_report(report: &AnalysisReport) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "{:<20} {}\n",
        "Reachable states:",
        report.reachable_state_count
    ));
    output.push_str(&format!(
        "{:<20} {}\n",
        "Deadlock free:",
        if report.is_deadlock_free {
            "yes".green()
        } else {
            "no".yellow()
        }
    ));

    output.push_str(&format!(
        "{:<20} {}\n",
        "Terminal states:",
        report.terminal_states.len()
    ));
    for state in &report.terminal_states {
        output.push_str(&format!("  {}\n", format_marking(state)));
    }

    if !report.invariants.is_empty() {
        output.push_str("Invariants:\n");
        for result in &report.invariants {
            let weights = result
                .weights
                .weights()
                .iter()
                .map(|(place, w)| format!("{}*{}", w, place))
                .collect::<Vec<_>>()
                .join(" + ");
            output.push_str(&format!(
                "  {} {}\n",
                if result.holds {
                    "holds ".green()
                } else {
                    "broken".red()
                },
                if weights.is_empty() { "0".to_string() } else { weights }
            ));
        }
    }

    if let Some(dot) = &report.dot {
        output.push('\n');
        output.push_str(dot);
    }

    output.trim_end().to_string()
}

/// Formats a marking as `place=tokens` pairs.
pub fn format_marking(marking: &BTreeMap<String, u64>) -> String {
    marking
        .iter()
        .map(|(place, tokens)| {
            if *tokens > 0 {
                format!("{}={}", place.cyan(), tokens)
            } else {
                format!("{}={}", place, tokens).dimmed().to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parses a JSON argument (either inline JSON or @file.json).
pub fn parse_json_arg(arg: &str) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    if let Some(path) = arg.strip_prefix('@') {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    } else {
        Ok(serde_json::from_str(arg)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const COFFEE_JSON: &str = r#"{
        "transitions": [
            {"name": "heatWater", "inputs": ["waterCold"], "outputs": ["waterHot"]},
            {"name": "grindBeans", "inputs": ["beansWhole"], "outputs": ["beansGround"]},
            {"name": "pourOver", "inputs": ["waterHot", "beansGround", "cupEmpty"], "outputs": ["coffeeReady"]}
        ],
        "initialMarking": {
            "waterCold": 1, "waterHot": 0, "beansWhole": 1,
            "beansGround": 0, "cupEmpty": 1, "coffeeReady": 0
        }
    }"#;

    const TOGGLE_YAML: &str = "\
transitions:
  - name: switchOn
    inputs: [off]
    outputs: [on]
  - name: switchOff
    inputs: on
    outputs: off
initial_marking:
  off: 1
  on: 0
";

    fn write_net(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn plain() {
        colored::control::set_override(false);
    }

    #[test]
    fn test_load_net_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let json = load_net(&write_net(dir.path(), "coffee.json", COFFEE_JSON)).unwrap();
        let yaml = load_net(&write_net(dir.path(), "toggle.yml", TOGGLE_YAML)).unwrap();

        assert_eq!(json.place_count(), 6);
        assert_eq!(yaml.place_count(), 2);
        assert_eq!(yaml.transitions().len(), 2);
    }

    #[test]
    fn test_load_missing_net() {
        let err = load_net(Path::new("/nonexistent/net.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read net"));
    }

    #[test]
    fn test_analyse_json_output() {
        let dir = tempfile::tempdir().unwrap();
        let net = write_net(dir.path(), "coffee.json", COFFEE_JSON);

        let output = execute(
            Commands::Analyse {
                net,
                dot: false,
                invariants: vec![r#"{"waterCold": 1, "waterHot": 1}"#.to_string()],
                max_states: None,
                json: true,
            },
            &Config::default(),
        )
        .unwrap();

        let report: AnalysisReport = serde_json::from_str(&output).unwrap();
        assert_eq!(report.reachable_state_count, 5);
        assert!(!report.is_deadlock_free);
        assert!(!report.invariants[0].holds);
    }

    #[test]
    fn test_analyse_text_output() {
        plain();
        let dir = tempfile::tempdir().unwrap();
        let net = write_net(dir.path(), "toggle.yaml", TOGGLE_YAML);

        let output = execute(
            Commands::Analyse {
                net,
                dot: true,
                invariants: vec![],
                max_states: None,
                json: false,
            },
            &Config::default(),
        )
        .unwrap();

        assert!(output.contains("Reachable states:    2"));
        assert!(output.contains("Deadlock free:       yes"));
        assert!(output.contains("digraph"));
    }

    #[test]
    fn test_analyse_respects_state_cap() {
        let dir = tempfile::tempdir().unwrap();
        let net = write_net(dir.path(), "coffee.json", COFFEE_JSON);

        let mut config = Config::default();
        config.explorer.max_states = 3;
        let err = execute(
            Commands::Analyse {
                net,
                dot: false,
                invariants: vec![],
                max_states: None,
                json: false,
            },
            &config,
        )
        .unwrap_err();
        assert!(err.to_string().contains("exceeds 3"));
    }

    #[test]
    fn test_dot_with_marking() {
        let dir = tempfile::tempdir().unwrap();
        let net = write_net(dir.path(), "toggle.yaml", TOGGLE_YAML);

        let output = execute(
            Commands::Dot {
                net,
                marking: Some(r#"{"off": 0, "on": 1}"#.to_string()),
            },
            &Config::default(),
        )
        .unwrap();
        assert!(output.contains("on\\n1"));
        assert!(output.contains("off\\n0"));
    }

    #[test]
    fn test_reachable_with_trace() {
        plain();
        let dir = tempfile::tempdir().unwrap();
        let net = write_net(dir.path(), "coffee.json", COFFEE_JSON);

        let output = execute(
            Commands::Reachable {
                net,
                max_states: None,
                trace: true,
                json: false,
            },
            &Config::default(),
        )
        .unwrap();
        assert!(output.starts_with("5 reachable states"));
        assert!(output.contains("heatWater -> grindBeans -> pourOver"));
    }

    #[test]
    fn test_parse_json_arg_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_net(dir.path(), "weights.json", r#"{"a": 2}"#);
        let value = parse_json_arg(&format!("@{}", path.display())).unwrap();
        assert_eq!(value["a"], 2);
    }

    #[test]
    fn test_repl_reports_bad_net_as_error() {
        let dir = tempfile::tempdir().unwrap();

        let missing = execute(
            Commands::Repl {
                net: dir.path().join("missing.json"),
            },
            &Config::default(),
        );
        assert!(missing.is_err());

        let net = write_net(dir.path(), "broken.json", r#"{"transitions": "#);
        let broken = execute(Commands::Repl { net }, &Config::default());
        assert!(broken.is_err());
    }
}
