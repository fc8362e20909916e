use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::json;

use installer_rules::rules::condition::{Condition, ConditionKind, Operand};
use installer_rules::rules::environment::{Environment, InstallData, SystemUser, UserIdentity};
use installer_rules::rules::loader::RulesLoader;
use installer_rules::rules::registry::ConditionRegistry;
use installer_rules::rules::types::RulesSpec;

use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Rules specification (YAML). Falls back to $RULES_SPEC
    #[arg(short, long, global = true)]
    spec: Option<PathBuf>,

    /// Set an installer variable
    #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_assignment, global = true)]
    vars: Vec<(String, String)>,

    /// Mark a pack as selected
    #[arg(long = "select", value_name = "PACKID", global = true)]
    selected: Vec<String>,

    /// User the installer runs as. Falls back to $RULES_USER, then the login user
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate condition ids or expressions
    Check {
        /// Ids or expressions such as `a+!b`
        #[arg(required = true)]
        expressions: Vec<String>,
    },
    /// Whether a panel can be shown
    Panel { panel_id: String },
    /// Whether a pack can be installed
    Pack { pack_id: String },
    /// List known condition ids
    Ids,
    /// Explain what a condition depends on
    Explain { id: String },
    /// Print the user-defined conditions and bindings as YAML
    Export,
}

fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{}'", raw)),
    }
}

fn build_registry(args: &Args) -> anyhow::Result<ConditionRegistry> {
    let spec_path = args
        .spec
        .clone()
        .or_else(|| std::env::var("RULES_SPEC").ok().map(PathBuf::from));

    let spec = match spec_path {
        Some(path) => {
            log::info!("Loading rules from {}", path.display());
            RulesLoader::new()
                .load_file(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?
        }
        None => {
            log::warn!("No rules specification given, only built-in conditions are known");
            RulesSpec::default()
        }
    };

    let data = Arc::new(InstallData::with_packs(spec.packs.clone()));
    for (name, value) in &args.vars {
        data.set_variable(name, value);
    }
    for pack_id in &args.selected {
        data.select_pack(pack_id);
    }
    let user = args
        .user
        .clone()
        .or_else(|| std::env::var("RULES_USER").ok())
        .or_else(|| SystemUser.current_user());
    data.set_user(user);

    let mut registry = ConditionRegistry::new(Environment::new(data));
    RulesLoader::new()
        .apply(&spec, &mut registry)
        .context("Invalid rules specification")?;
    Ok(registry)
}

fn explain(registry: &ConditionRegistry, condition: &Condition, depth: usize, lines: &mut Vec<String>) {
    lines.push(format!(
        "{}{} [{}]",
        "  ".repeat(depth),
        condition.describe(),
        registry.is_true(condition)
    ));

    let mut linked: Vec<&str> = Vec::new();
    if let ConditionKind::Ref { target } = condition.kind() {
        linked.push(target);
    }
    for operand in condition.operands() {
        match operand {
            Operand::Id(id) => linked.push(id),
            Operand::Inline(inner) => explain(registry, inner, depth + 1, lines),
        }
    }
    for id in linked {
        match registry.get_condition(id) {
            Some(target) => explain(registry, &target, depth + 1, lines),
            None => lines.push(format!("{}{} is not defined", "  ".repeat(depth + 1), id)),
        }
    }
}

fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let registry = build_registry(&args)?;

    match &args.command {
        Commands::Check { expressions } => {
            let results: Vec<_> = expressions
                .iter()
                .map(|expr| {
                    let known = registry.get_condition(expr).is_some();
                    (expr, registry.is_condition_true(expr), known)
                })
                .collect();
            if args.json {
                let out: Vec<_> = results
                    .iter()
                    .map(|(expr, value, known)| json!({"condition": expr, "value": value, "known": known}))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                for (expr, value, known) in results {
                    let note = if known { "" } else { " (unknown)" };
                    println!("{}: {}{}", expr, value, note);
                }
            }
        }
        Commands::Panel { panel_id } => {
            let allowed = registry.can_show_panel(panel_id);
            let condition = registry.panel_condition(panel_id);
            if args.json {
                let out = json!({"panel": panel_id, "condition": condition, "show": allowed});
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{}: show={} (condition: {})", panel_id, allowed, condition.unwrap_or("none"));
            }
        }
        Commands::Pack { pack_id } => {
            let allowed = registry.can_install_pack(pack_id);
            let optional = registry.can_install_pack_optional(pack_id);
            let condition = registry.pack_condition(pack_id);
            if args.json {
                let out = json!({
                    "pack": pack_id,
                    "condition": condition,
                    "install": allowed,
                    "optional": optional,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!(
                    "{}: install={} optional={} (condition: {})",
                    pack_id,
                    allowed,
                    optional,
                    condition.unwrap_or("none")
                );
            }
        }
        Commands::Ids => {
            let ids = registry.known_condition_ids();
            if args.json {
                println!("{}", serde_json::to_string_pretty(&ids)?);
            } else {
                for id in ids {
                    let tag = if registry.is_builtin(&id) { " (built-in)" } else { "" };
                    println!("{}{}", id, tag);
                }
            }
        }
        Commands::Explain { id } => {
            let condition = registry
                .get_condition(id)
                .with_context(|| format!("Condition '{}' is not defined", id))?;
            let mut lines = Vec::new();
            explain(&registry, &condition, 0, &mut lines);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&lines)?);
            } else {
                for line in lines {
                    println!("{}", line);
                }
            }
        }
        Commands::Export => {
            let spec = registry.export_spec();
            if args.json {
                println!("{}", serde_json::to_string_pretty(&spec)?);
            } else {
                print!("{}", serde_yaml::to_string(&spec)?);
            }
        }
    }

    Ok(())
}
