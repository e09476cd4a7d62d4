use anyhow::Context as _;
use std::collections::BTreeMap;

use swarmr_core::{RunContext, RunOverrides};
use swarmr_http::HttpClient;

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::http_scenario::HttpScenario;
use crate::output::{self, RunHeader};
use crate::plan;
use crate::run_error::RunError;

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);

    let env = merged_env(&args.env).map_err(RunError::InvalidInput)?;
    let plan = plan::load_plan(&args.plan, &env, args.strict_data)
        .await
        .map_err(RunError::InvalidInput)?;

    let dataset = match &plan.dataset {
        Some(d) => {
            let dataset = d
                .loader
                .load_path(&d.path)
                .await
                .with_context(|| format!("failed to load dataset: {}", d.path.display()))
                .map_err(RunError::InvalidInput)?;
            log::info!("loaded {} dataset records from {}", dataset.len(), d.path.display());
            Some(dataset)
        }
        None => None,
    };

    let overrides = RunOverrides {
        vus: args.vus,
        iterations: args.iterations,
        duration: args.duration,
    };
    let cfg = swarmr_core::resolve_config(plan.options.clone(), overrides)
        .context("invalid run options")
        .map_err(RunError::InvalidInput)?;

    let header = RunHeader {
        plan: plan.name.clone(),
        vus: cfg.vus,
        iterations: cfg.iterations,
        duration: cfg.duration,
        dataset_records: dataset.as_ref().map(|d| d.len()),
    };

    let mut ctx = RunContext::new(cfg)
        .context("invalid run options")
        .map_err(RunError::InvalidInput)?;
    if let Some(dataset) = dataset {
        ctx = ctx.with_dataset(dataset);
    }

    let scenario = HttpScenario::new(plan, ctx.metrics(), HttpClient::default())
        .context("failed to register plan metrics")
        .map_err(RunError::InvalidInput)?;

    out.print_header(&header);

    let stop = ctx.stop_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupt received, stopping virtual users");
            stop.stop();
        }
    });

    let result = swarmr_core::run(ctx, scenario, out.progress()).await;
    ctrl_c.abort();
    let result = result.context("run failed").map_err(RunError::RuntimeError)?;

    let report = swarmr_core::render(&result);
    out.print_summary(&report).map_err(RunError::RuntimeError)?;

    Ok(ExitCode::from_thresholds(report.overall_passed))
}

fn merged_env(overrides: &[String]) -> anyhow::Result<BTreeMap<String, String>> {
    // Non-UTF-8 entries cannot appear in a plan, so they are skipped.
    let mut map: BTreeMap<String, String> = std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect();

    for raw in overrides {
        let (k, v) = parse_env_override(raw)?;
        map.insert(k, v);
    }

    Ok(map)
}

fn parse_env_override(s: &str) -> anyhow::Result<(String, String)> {
    let (k, v) = s
        .split_once('=')
        .with_context(|| format!("invalid --env (expected KEY=VALUE): {s}"))?;
    if k.is_empty() {
        anyhow::bail!("invalid --env (empty KEY): {s}");
    }
    Ok((k.to_string(), v.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_override_splits_on_the_first_equals() {
        let (k, v) = parse_env_override("TOKEN=a=b").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(k, "TOKEN");
        assert_eq!(v, "a=b");
    }

    #[test]
    fn env_override_requires_a_key() {
        assert!(parse_env_override("=value").is_err());
        assert!(parse_env_override("novalue").is_err());
    }

    #[test]
    fn cli_env_wins_over_process_env() {
        let env = merged_env(&["PATH=overridden".to_string()]).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(env.get("PATH").map(String::as_str), Some("overridden"));
    }
}
