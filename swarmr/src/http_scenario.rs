use swarmr_core::{Counter, IterationContext, Rate, Registry, Scenario, Trend};
use swarmr_http::{
    Confirmation, ConfirmationOutcome, HttpClient, HttpRequest, HttpResponse, ShapeResolver,
};

use crate::plan::{CheckKind, CheckPlan, Plan, RequestPlan};

pub(crate) const HTTP_REQS: &str = "http_reqs";
pub(crate) const HTTP_REQ_DURATION: &str = "http_req_duration";
pub(crate) const HTTP_REQ_FAILED: &str = "http_req_failed";

struct HttpMetrics {
    reqs: Counter,
    duration: Trend,
    /// Sample is `true` when the request failed.
    failed: Rate,
    custom: Option<Trend>,
}

struct ListMetric {
    resolver: ShapeResolver,
    count: Option<Trend>,
}

/// Runs one plan request per iteration and feeds the k6-style HTTP metrics.
pub(crate) struct HttpScenario {
    client: HttpClient,
    request: RequestPlan,
    metrics: HttpMetrics,
    list: Option<ListMetric>,
    confirm: Option<Confirmation>,
    checks: Vec<CheckPlan>,
}

impl HttpScenario {
    /// Registers every metric the plan names. A name already taken by another kind fails here,
    /// before any VU starts.
    pub(crate) fn new(
        plan: Plan,
        registry: &Registry,
        client: HttpClient,
    ) -> swarmr_core::Result<Self> {
        let metrics = HttpMetrics {
            reqs: registry.counter(HTTP_REQS)?,
            duration: registry.trend(HTTP_REQ_DURATION)?,
            failed: registry.rate(HTTP_REQ_FAILED)?,
            custom: plan.trend.as_deref().map(|n| registry.trend(n)).transpose()?,
        };

        let list = plan
            .list
            .map(|l| -> swarmr_core::Result<ListMetric> {
                Ok(ListMetric {
                    resolver: l.resolver,
                    count: l.count_metric.as_deref().map(|n| registry.trend(n)).transpose()?,
                })
            })
            .transpose()?;

        Ok(Self {
            client,
            request: plan.request,
            metrics,
            list,
            confirm: plan.confirm,
            checks: plan.checks,
        })
    }

    fn build_request(&self, ctx: &IterationContext) -> HttpRequest {
        let plan = &self.request;
        let mut req = HttpRequest::new(plan.method.clone(), plan.url.render(ctx));
        for (name, value) in &plan.headers {
            req = req.header(name.clone(), value.render(ctx));
        }
        if let Some(body) = &plan.body {
            req = req.body(body.render(ctx));
        }
        if let Some(timeout) = plan.timeout {
            req = req.timeout(timeout);
        }
        req
    }

    fn record_response(&self, res: &HttpResponse) {
        let ms = res.elapsed_ms();
        self.metrics.reqs.increment();
        self.metrics.duration.add(ms);
        if let Some(custom) = &self.metrics.custom {
            custom.add(ms);
        }
        self.metrics.failed.add(res.status >= 400);
    }
}

impl Scenario for HttpScenario {
    type Error = anyhow::Error;

    async fn run(&self, ctx: &IterationContext) -> anyhow::Result<()> {
        let req = self.build_request(ctx);
        let res = match self.client.request(req).await {
            Ok(res) => res,
            Err(err) => {
                self.metrics.reqs.increment();
                self.metrics.failed.add(true);
                return Err(err.into());
            }
        };
        self.record_response(&res);

        let needs_json = self.list.is_some()
            || self.checks.iter().any(|c| c.kind == CheckKind::Json);
        let body = if needs_json { res.json().ok() } else { None };

        let listed = self.list.as_ref().map(|list| {
            let resolved = match &body {
                Some(json) => list.resolver.resolve(json).map(|r| r.items.len()),
                // Reparse to surface the decode error.
                None => res
                    .json()
                    .and_then(|json| list.resolver.resolve(&json).map(|r| r.items.len())),
            };
            if let (Ok(len), Some(count)) = (&resolved, &list.count) {
                count.add(*len as f64);
            }
            resolved
        });

        let confirmed = self.confirm.as_ref().map(|c| c.evaluate(&res));

        for check in &self.checks {
            let passed = match &check.kind {
                CheckKind::Status(status) => res.status == *status,
                CheckKind::MaxDuration(max) => res.elapsed <= *max,
                CheckKind::BodyContains(needle) => {
                    res.body_utf8().is_some_and(|b| b.contains(needle.as_str()))
                }
                CheckKind::Json => body.is_some(),
                CheckKind::List => listed.as_ref().is_some_and(Result::is_ok),
                CheckKind::Confirm => confirmed
                    .as_ref()
                    .is_some_and(ConfirmationOutcome::is_accepted),
            };
            ctx.check(&check.name, passed);
        }

        if let Some(Err(err)) = listed {
            return Err(anyhow::Error::new(err).context(format!("status {}", res.status)));
        }
        if let Some(ConfirmationOutcome::Rejected(reason)) = confirmed {
            anyhow::bail!("not confirmed: {reason}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::Path;
    use swarmr_core::{CHECKS, ITERATION_ERRORS, RunConfig, RunContext, RunResult, run};
    use swarmr_testserver::TestServer;

    use crate::plan::parse_plan;

    fn plan(text: &str, base_url: &str) -> anyhow::Result<Plan> {
        let env: BTreeMap<String, String> = [("BASE_URL".to_string(), base_url.to_string())]
            .into_iter()
            .collect();
        parse_plan(text, "test", Path::new("."), &env, false)
    }

    fn pass_fraction(result: &RunResult, metric: &str) -> Option<f64> {
        result.metrics.get(metric).and_then(|m| m.pass_fraction())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn list_plan_records_http_metrics_and_counts() -> anyhow::Result<()> {
        let server = TestServer::start().await?;
        let plan = plan(
            r#"
request:
  url: ${BASE_URL}/webapi/notifications
trend: get_notifications_duration
list:
  shapes: [notifications, array]
  countMetric: notifications_count
checks:
  - { name: status 200, status: 200 }
  - { name: json body, json: true }
  - { name: list resolved, list: true }
"#,
            server.base_url(),
        )?;

        let ctx = RunContext::new(RunConfig::with_iterations(3, 5))?;
        let scenario = HttpScenario::new(plan, ctx.metrics(), HttpClient::default())?;
        let result = run(ctx, scenario, None).await?;

        anyhow::ensure!(result.metrics.counter_total(HTTP_REQS) == 15);
        let count = result
            .metrics
            .get("notifications_count")
            .and_then(|m| m.trend())
            .map(|t| (t.count(), t.avg()));
        anyhow::ensure!(count == Some((15, 2.0)), "{count:?}");
        let custom = result.metrics.get("get_notifications_duration");
        anyhow::ensure!(custom.map(|m| m.count()) == Some(15));
        anyhow::ensure!(pass_fraction(&result, HTTP_REQ_FAILED) == Some(0.0));
        anyhow::ensure!(pass_fraction(&result, CHECKS) == Some(1.0));
        anyhow::ensure!(result.iterations_failed == 0);

        server.shutdown().await;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn unrecognized_shape_fails_the_iteration() -> anyhow::Result<()> {
        let server = TestServer::start().await?;
        let plan = plan(
            r#"
request: { url: "${BASE_URL}/webapi/notifications" }
list: { shapes: [courses] }
checks: [{ name: list resolved, list: true }]
"#,
            server.base_url(),
        )?;

        let ctx = RunContext::new(RunConfig::with_iterations(1, 2))?;
        let scenario = HttpScenario::new(plan, ctx.metrics(), HttpClient::default())?;
        let result = run(ctx, scenario, None).await?;

        anyhow::ensure!(result.metrics.counter_total(ITERATION_ERRORS) == 2);
        anyhow::ensure!(result.checks.len() == 1 && result.checks[0].fails == 2);

        server.shutdown().await;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn error_status_marks_request_failed() -> anyhow::Result<()> {
        let server = TestServer::start().await?;
        let plan = plan(
            "request: { url: \"${BASE_URL}/status/500\" }\nchecks: [{ name: ok, status: 200 }]\n",
            server.base_url(),
        )?;

        let ctx = RunContext::new(RunConfig::with_iterations(2, 2))?;
        let scenario = HttpScenario::new(plan, ctx.metrics(), HttpClient::default())?;
        let result = run(ctx, scenario, None).await?;

        anyhow::ensure!(pass_fraction(&result, HTTP_REQ_FAILED) == Some(1.0));
        anyhow::ensure!(result.checks[0].passes == 0 && result.checks[0].fails == 4);
        anyhow::ensure!(result.iterations_failed == 0);

        server.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn plan_metric_clashing_with_builtin_is_a_setup_error() -> anyhow::Result<()> {
        let plan = plan("request: { url: http://x }\ntrend: iterations\n", "http://x")?;
        let ctx = RunContext::new(RunConfig::with_iterations(1, 1))?;
        anyhow::ensure!(matches!(
            HttpScenario::new(plan, ctx.metrics(), HttpClient::default()),
            Err(swarmr_core::Error::Metric(_))
        ));
        Ok(())
    }
}
