//! CLI harness (§4.11): evaluate a datafile/feature/context triple standalone, for
//! local debugging and CI smoke checks, without wiring up a full instance.

use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use flagcore::evaluation::{self, EvaluationInputs, Reason};
use flagcore::model::Datafile;
use flagcore::overrides::Overrides;
use flagcore::types::{AttributeValue, Context};

#[derive(Parser)]
#[command(name = "flagcore-eval", about = "Evaluate a feature against a datafile")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate a feature's enabled/variation/variable decision.
    Eval {
        /// Path to the datafile JSON.
        #[arg(long)]
        datafile: PathBuf,
        /// Feature key to evaluate.
        #[arg(long)]
        feature: String,
        /// Variable key to evaluate (omit to evaluate flag + variation only).
        #[arg(long)]
        variable: Option<String>,
        /// Context JSON, either inline or `@path/to/file.json`.
        #[arg(long, default_value = "{}")]
        context: String,
        /// Print machine-readable JSON instead of colored text.
        #[arg(long)]
        json: bool,
    },
}

fn load_json(spec: &str) -> serde_json::Result<serde_json::Value> {
    if let Some(path) = spec.strip_prefix('@') {
        let raw = fs::read_to_string(path).unwrap_or_else(|e| {
            eprintln!("failed to read {path}: {e}");
            std::process::exit(1);
        });
        serde_json::from_str(&raw)
    } else {
        serde_json::from_str(spec)
    }
}

fn context_from_json(value: serde_json::Value) -> Context {
    let mut ctx = Context::new();
    if let serde_json::Value::Object(map) = value {
        for (key, v) in map {
            match serde_json::from_value::<AttributeValue>(v.clone()) {
                Ok(attr) => {
                    ctx.insert(key, attr);
                }
                Err(_) => {
                    ctx.insert(key, AttributeValue::String(v.to_string()));
                }
            }
        }
    }
    ctx
}

fn reason_color(reason: Reason, text: &str) -> colored::ColoredString {
    match reason {
        Reason::NotFound | Reason::NoVariations | Reason::Error => text.red(),
        Reason::Disabled | Reason::OutOfRange | Reason::Required => text.yellow(),
        _ => text.green(),
    }
}

fn main() {
    tracing_subscriber_init();
    let cli = Cli::parse();

    match cli.command {
        Command::Eval {
            datafile,
            feature,
            variable,
            context,
            json,
        } => {
            let raw = fs::read_to_string(&datafile).unwrap_or_else(|e| {
                eprintln!("failed to read {}: {e}", datafile.display());
                std::process::exit(1);
            });
            let datafile: Datafile = serde_json::from_str(&raw).unwrap_or_else(|e| {
                eprintln!("failed to parse datafile: {e}");
                std::process::exit(1);
            });
            let context_value = load_json(&context).unwrap_or_else(|e| {
                eprintln!("failed to parse context: {e}");
                std::process::exit(1);
            });
            let ctx = context_from_json(context_value);

            let sticky = Overrides::new();
            let initial = Overrides::new();
            let inputs = EvaluationInputs {
                datafile: &datafile,
                sticky: &sticky,
                initial: &initial,
                is_ready: true,
                bucket_key_separator: ".",
            };

            if let Some(variable_key) = variable {
                let eval =
                    evaluation::evaluate_variable(&feature, &variable_key, &ctx, &ctx, &inputs);
                if json {
                    println!(
                        "{}",
                        serde_json::json!({
                            "featureKey": eval.feature_key,
                            "variableKey": eval.variable_key,
                            "reason": format!("{:?}", eval.reason),
                            "value": eval.value,
                        })
                    );
                } else {
                    println!(
                        "{} {} = {:?} ({})",
                        "variable".bold(),
                        variable_key,
                        eval.value,
                        reason_color(eval.reason, &format!("{:?}", eval.reason))
                    );
                }
            } else {
                let flag_eval = evaluation::evaluate_flag(&feature, &ctx, &ctx, &inputs);
                let variation_eval = evaluation::evaluate_variation(&feature, &ctx, &ctx, &inputs);
                if json {
                    println!(
                        "{}",
                        serde_json::json!({
                            "featureKey": feature,
                            "enabled": flag_eval.enabled,
                            "enabledReason": format!("{:?}", flag_eval.reason),
                            "variation": variation_eval.variation,
                            "variationReason": format!("{:?}", variation_eval.reason),
                        })
                    );
                } else {
                    let mark = if flag_eval.enabled {
                        "\u{2713}".green()
                    } else {
                        "\u{2717}".red()
                    };
                    println!(
                        "{mark} {} enabled={} ({}) variation={:?} ({})",
                        feature,
                        flag_eval.enabled,
                        reason_color(flag_eval.reason, &format!("{:?}", flag_eval.reason)),
                        variation_eval.variation,
                        reason_color(variation_eval.reason, &format!("{:?}", variation_eval.reason)),
                    );
                }
            }
        }
    }
}

fn tracing_subscriber_init() {
    let _ = tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(tracing::Level::WARN)
            .finish(),
    );
}
