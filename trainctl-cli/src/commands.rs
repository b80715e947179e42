//! CLI subcommand handlers.

use crate::Commands;
use anyhow::{Context, bail};
use serde::Deserialize;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::info;
use trainctl_core::rules::parse;
use trainctl_core::{
    ControlFlag, ControlState, EngineConfig, LoopConfig, MetricMap, MetricRegistry, PolicyEngine,
    TrainerState, Trigger, load_loop_config, load_policy,
};

/// Handle a CLI subcommand.
pub fn handle_command(command: Commands, config: &EngineConfig) -> anyhow::Result<()> {
    match command {
        Commands::Validate {
            policy,
            loop_config,
        } => handle_validate(policy, loop_config.as_deref(), config),
        Commands::Replay {
            policy,
            events,
            loop_config,
            json,
        } => handle_replay(policy, &events, loop_config.as_deref(), json, config),
        Commands::Eval {
            rule,
            metrics,
            metrics_file,
        } => handle_eval(&rule, metrics.as_deref(), metrics_file.as_deref()),
        Commands::Triggers => handle_triggers(),
    }
}

fn resolve_policy(policy: Option<PathBuf>, config: &EngineConfig) -> anyhow::Result<PathBuf> {
    match policy.or_else(|| config.policy_path.clone()) {
        Some(path) => Ok(path),
        None => bail!("No policy given and no `policy_path` configured"),
    }
}

fn resolve_loop_config(path: Option<&Path>) -> anyhow::Result<LoopConfig> {
    match path {
        Some(path) => load_loop_config(path)
            .map_err(|e| anyhow::anyhow!("Failed to load loop configuration: {}", e)),
        None => Ok(LoopConfig::default()),
    }
}

fn handle_validate(
    policy: Option<PathBuf>,
    loop_config: Option<&Path>,
    config: &EngineConfig,
) -> anyhow::Result<()> {
    let path = resolve_policy(policy, config)?;
    let loop_config = resolve_loop_config(loop_config)?;
    let registry = MetricRegistry::with_builtins();
    let loaded = load_policy(&path, &loop_config, &registry)
        .with_context(|| format!("Policy {} failed to load", path.display()))?;

    println!("Policy {} is valid.", path.display());
    for controller in loaded.controllers() {
        let definition = controller.definition();
        let triggers: Vec<&str> = definition.triggers.iter().map(|t| t.as_str()).collect();
        let flags: Vec<String> = definition
            .control_operation
            .iter()
            .map(|(flag, value)| format!("{}={}", flag, value))
            .collect();
        println!("\n  {}", controller.name());
        println!("    triggers: {}", triggers.join(", "));
        for handler in controller.handlers() {
            println!("    metric:   {} ({})", handler.name(), handler.handler_class());
        }
        for (index, rule) in controller.rules().iter().enumerate() {
            match rule.compile_error() {
                Some(err) => println!("    rule {}:   {}  [invalid: {}]", index, rule.source(), err),
                None => println!("    rule {}:   {}", index, rule.source()),
            }
        }
        println!("    control:  {}", flags.join(", "));
        if let Some(format) = &definition.log_format {
            let level = definition.log_level.unwrap_or_default();
            println!("    log:      {:?} {}", level, format);
        }
    }
    Ok(())
}

/// One line of a replay trace.
#[derive(Debug, Deserialize)]
struct ReplayEvent {
    trigger: Trigger,
    #[serde(default)]
    state: TrainerState,
    #[serde(default)]
    metrics: Option<MetricMap>,
}

fn parse_events(reader: impl BufRead) -> anyhow::Result<Vec<ReplayEvent>> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: ReplayEvent = serde_json::from_str(&line)
            .with_context(|| format!("Invalid event on line {}", index + 1))?;
        events.push(event);
    }
    Ok(events)
}

fn handle_replay(
    policy: Option<PathBuf>,
    events: &Path,
    loop_config: Option<&Path>,
    json: bool,
    config: &EngineConfig,
) -> anyhow::Result<()> {
    let path = resolve_policy(policy, config)?;
    let loop_config = resolve_loop_config(loop_config)?;
    let registry = MetricRegistry::with_builtins();
    let mut engine = PolicyEngine::from_file(&path, &loop_config, &registry, config)
        .with_context(|| format!("Policy {} failed to load", path.display()))?;

    let file = std::fs::File::open(events)
        .with_context(|| format!("Cannot open event trace {}", events.display()))?;
    let trace = parse_events(BufReader::new(file))?;
    info!(
        policy = %path.display(),
        events = trace.len(),
        controllers = engine.controllers().len(),
        "Replaying event trace"
    );

    for (index, event) in trace.iter().enumerate() {
        let mut control = ControlState::default();
        let report = engine.dispatch(
            event.trigger,
            &event.state,
            &mut control,
            &loop_config,
            event.metrics.as_ref(),
        );
        if json {
            let line = serde_json::json!({
                "event": index + 1,
                "report": report,
                "control": control,
            });
            println!("{}", line);
            continue;
        }
        let raised = control.raised();
        let fired: Vec<&str> = report.fired().collect();
        println!(
            "#{:<4} {:<28} step {:<6} fired: {:<24} flags: {}",
            index + 1,
            event.trigger.as_str(),
            event.state.global_step,
            if fired.is_empty() { "-".to_string() } else { fired.join(",") },
            if raised.is_empty() { "-".to_string() } else { raised.join(",") },
        );
    }

    let summary = engine.diagnostics().summary();
    if json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        println!(
            "\n{} events, {} rules evaluated, {} fired, {} rule errors",
            summary.dispatches, summary.rules_evaluated, summary.total_fired, summary.total_failures
        );
        for failure in &summary.recent_failures {
            println!(
                "  {} rule {} on {}: {}",
                failure.controller, failure.rule_index, failure.trigger, failure.error
            );
        }
    }
    Ok(())
}

fn read_metrics(metrics: Option<&str>, metrics_file: Option<&Path>) -> anyhow::Result<MetricMap> {
    if let Some(path) = metrics_file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read metrics file {}", path.display()))?;
        return serde_json::from_str(&content).context("Metrics file is not a JSON object");
    }
    match metrics {
        Some(text) => serde_json::from_str(text).context("Metrics are not a JSON object"),
        None => Ok(MetricMap::new()),
    }
}

fn handle_eval(
    rule: &str,
    metrics: Option<&str>,
    metrics_file: Option<&Path>,
) -> anyhow::Result<()> {
    let metrics = read_metrics(metrics, metrics_file)?;
    let expr = match parse(rule) {
        Ok(expr) => expr,
        Err(e) => bail!("Rule does not compile: {}", e),
    };
    match trainctl_core::rules::evaluate(&expr, &metrics) {
        Ok(value) => {
            println!("value:  {}", value);
            println!("fires:  {}", value.is_truthy());
            Ok(())
        }
        Err(e) => bail!("Rule evaluation failed: {}", e),
    }
}

fn handle_triggers() -> anyhow::Result<()> {
    println!("Triggers:");
    for trigger in Trigger::ALL {
        println!("  {}", trigger);
    }
    println!("\nControl flags:");
    for flag in ControlFlag::ALL {
        println!("  {}", flag);
    }
    println!("\nHandler classes:");
    for class in MetricRegistry::with_builtins().list_classes() {
        println!("  {}", class);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use trainctl_core::MetricValue;

    #[test]
    fn test_parse_events_skips_blank_lines() {
        let trace = r#"{"trigger": "on_log", "state": {"global_step": 5, "log_history": [{"step": 5, "loss": 0.2}]}}

{"trigger": "on_evaluate", "metrics": {"eval_loss": 0.1}}
"#;
        let events = parse_events(trace.as_bytes()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].trigger, Trigger::OnLog);
        assert_eq!(events[0].state.global_step, 5);
        assert_eq!(events[0].state.last_logged("loss"), Some(0.2));
        assert_eq!(
            events[1].metrics.as_ref().unwrap()["eval_loss"],
            MetricValue::Number(0.1)
        );
    }

    #[test]
    fn test_parse_events_reports_line() {
        let trace = "{\"trigger\": \"on_log\"}\n{\"trigger\": \"on_nothing\"}\n";
        let err = parse_events(trace.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_read_metrics_inline() {
        let metrics = read_metrics(Some(r#"{"loss": 0.5, "tags": ["a"]}"#), None).unwrap();
        assert_eq!(metrics["loss"], MetricValue::Number(0.5));
        assert!(read_metrics(Some("[1, 2]"), None).is_err());
        assert!(read_metrics(None, None).unwrap().is_empty());
    }

    #[test]
    fn test_resolve_policy_falls_back_to_config() {
        let config = EngineConfig {
            policy_path: Some(PathBuf::from("configured.yaml")),
            ..Default::default()
        };
        assert_eq!(
            resolve_policy(None, &config).unwrap(),
            PathBuf::from("configured.yaml")
        );
        assert!(resolve_policy(None, &EngineConfig::default()).is_err());
    }

    #[test]
    fn test_replay_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let policy = dir.path().join("policy.yaml");
        std::fs::write(
            &policy,
            r#"
controllers:
  - name: stop
    controller-metrics:
      - name: loss
        handler-class: Loss
    triggers: [on_log]
    rules: ["loss < 0.01"]
    control-operation:
      should_training_stop: true
"#,
        )
        .unwrap();
        let events = dir.path().join("events.jsonl");
        std::fs::write(
            &events,
            "{\"trigger\": \"on_log\", \"state\": {\"log_history\": [{\"loss\": 0.001}]}}\n",
        )
        .unwrap();
        handle_replay(Some(policy), &events, None, true, &EngineConfig::default()).unwrap();
    }
}
