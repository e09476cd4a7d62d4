use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use serde::Deserialize;
use swarmr_core::{DatasetSelection, RunOptions, ThresholdSet};
use swarmr_data::{DatasetLoader, FieldKind, FieldSpec, LoadMode, Schema};
use swarmr_http::{Confirmation, ConfirmationPolicy, Method, ResponseShape, ShapeResolver};

use crate::template::{Template, expand_env};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PlanYaml {
    name: Option<String>,
    vus: Option<u64>,
    iterations: Option<u64>,
    duration: Option<YamlDuration>,
    iteration_delay: Option<YamlDuration>,
    grace_period: Option<YamlDuration>,
    dataset: Option<DatasetYaml>,
    request: RequestYaml,
    /// Extra Trend (ms) fed with every request duration, e.g. `get_notifications_duration`.
    trend: Option<String>,
    list: Option<ListYaml>,
    confirm: Option<ConfirmYaml>,
    #[serde(default)]
    checks: Vec<CheckYaml>,
    #[serde(default)]
    thresholds: BTreeMap<String, ThresholdExprYaml>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct DatasetYaml {
    path: String,
    #[serde(default = "default_delimiter")]
    delimiter: char,
    fields: Vec<FieldYaml>,
    #[serde(default)]
    strict: bool,
    selection: Option<String>,
}

fn default_delimiter() -> char {
    ','
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldYaml {
    name: String,
    kind: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RequestYaml {
    method: Option<String>,
    url: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    body: Option<String>,
    timeout: Option<YamlDuration>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ListYaml {
    shapes: Vec<String>,
    count_metric: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ConfirmYaml {
    field: String,
    #[serde(default = "default_equals")]
    equals: serde_json::Value,
    policy: Option<String>,
}

fn default_equals() -> serde_json::Value {
    serde_json::Value::Bool(true)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CheckYaml {
    name: String,
    status: Option<u16>,
    max_duration: Option<YamlDuration>,
    body_contains: Option<String>,
    #[serde(default)]
    json: bool,
    #[serde(default)]
    list: bool,
    #[serde(default)]
    confirm: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ThresholdExprYaml {
    One(String),
    Many(Vec<ThresholdItemYaml>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ThresholdItemYaml {
    Expr(String),
    Detailed {
        threshold: String,
        #[serde(default, rename = "abortOnFail")]
        abort_on_fail: bool,
    },
}

/// Humantime string (`10s`), integer seconds or float seconds.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    fn into_inner(self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(|v| YamlDuration(Duration::from_secs(v)))
                    .map_err(|_| E::custom("duration must not be negative"))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if !v.is_finite() || v < 0.0 {
                    return Err(E::custom("duration must be a non-negative, finite number"));
                }
                Ok(YamlDuration(Duration::from_secs_f64(v)))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let d = humantime::parse_duration(v.trim()).map_err(E::custom)?;
                Ok(YamlDuration(d))
            }
        }

        deserializer.deserialize_any(V)
    }
}

/// A plan with environment placeholders expanded and every template compiled.
#[derive(Debug)]
pub(crate) struct Plan {
    pub name: String,
    pub options: RunOptions,
    pub dataset: Option<DatasetPlan>,
    pub request: RequestPlan,
    pub trend: Option<String>,
    pub list: Option<ListPlan>,
    pub confirm: Option<Confirmation>,
    pub checks: Vec<CheckPlan>,
}

#[derive(Debug)]
pub(crate) struct DatasetPlan {
    pub path: PathBuf,
    pub loader: DatasetLoader,
}

#[derive(Debug)]
pub(crate) struct RequestPlan {
    pub method: Method,
    pub url: Template,
    pub headers: Vec<(String, Template)>,
    pub body: Option<Template>,
    pub timeout: Option<Duration>,
}

#[derive(Debug)]
pub(crate) struct ListPlan {
    pub resolver: ShapeResolver,
    pub count_metric: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CheckPlan {
    pub name: String,
    pub kind: CheckKind,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CheckKind {
    Status(u16),
    MaxDuration(Duration),
    BodyContains(String),
    /// Body parses as JSON.
    Json,
    /// Body resolves through the plan's list shapes.
    List,
    /// Response passes the plan's confirmation.
    Confirm,
}

pub(crate) async fn load_plan(
    path: &Path,
    env: &BTreeMap<String, String>,
    strict_data: bool,
) -> anyhow::Result<Plan> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read plan: {}", path.display()))?;

    let default_name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("plan")
        .to_string();
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

    parse_plan(&text, &default_name, base_dir, env, strict_data)
        .with_context(|| format!("invalid plan: {}", path.display()))
}

pub(crate) fn parse_plan(
    text: &str,
    default_name: &str,
    base_dir: &Path,
    env: &BTreeMap<String, String>,
    strict_data: bool,
) -> anyhow::Result<Plan> {
    let doc: PlanYaml = serde_yaml::from_str(text).context("failed to parse YAML")?;

    let dataset = doc
        .dataset
        .map(|d| resolve_dataset(d, base_dir, env, strict_data))
        .transpose()
        .context("invalid `dataset`")?;
    let selection = dataset.as_ref().and_then(|(_, selection)| *selection);
    let dataset = dataset.map(|(plan, _)| plan);
    let schema = dataset.as_ref().map(|d| d.loader.schema());

    let request = resolve_request(doc.request, schema, env).context("invalid `request`")?;

    let list = doc.list.map(|l| ListPlan {
        // Shape parsing is infallible: anything but `array` names a field.
        resolver: ShapeResolver::new(
            l.shapes
                .iter()
                .filter_map(|s| s.parse::<ResponseShape>().ok())
                .collect(),
        ),
        count_metric: l.count_metric,
    });
    if list.as_ref().is_some_and(|l| l.resolver.shapes().is_empty()) {
        anyhow::bail!("`list.shapes` must name at least one shape");
    }

    let confirm = doc
        .confirm
        .map(|c| -> anyhow::Result<Confirmation> {
            let policy = match c.policy.as_deref() {
                Some(raw) => raw
                    .parse::<ConfirmationPolicy>()
                    .with_context(|| format!("unknown confirmation policy `{raw}`"))?,
                None => ConfirmationPolicy::default(),
            };
            Ok(Confirmation::new(c.field, c.equals, policy))
        })
        .transpose()?;

    let checks = doc
        .checks
        .into_iter()
        .map(|c| resolve_check(c, list.is_some(), confirm.is_some()))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let thresholds = doc
        .thresholds
        .into_iter()
        .map(|(metric, exprs)| threshold_set(metric, exprs))
        .collect();

    let options = RunOptions {
        vus: doc.vus,
        iterations: doc.iterations,
        duration: doc.duration.map(YamlDuration::into_inner),
        iteration_delay: doc.iteration_delay.map(YamlDuration::into_inner),
        grace_period: doc.grace_period.map(YamlDuration::into_inner),
        selection,
        thresholds,
    };

    Ok(Plan {
        name: doc.name.unwrap_or_else(|| default_name.to_string()),
        options,
        dataset,
        request,
        trend: doc.trend,
        list,
        confirm,
        checks,
    })
}

fn resolve_dataset(
    d: DatasetYaml,
    base_dir: &Path,
    env: &BTreeMap<String, String>,
    strict_data: bool,
) -> anyhow::Result<(DatasetPlan, Option<DatasetSelection>)> {
    let fields = d
        .fields
        .into_iter()
        .map(|f| -> anyhow::Result<FieldSpec> {
            let kind = match f.kind.as_deref() {
                Some(raw) => raw
                    .parse::<FieldKind>()
                    .with_context(|| format!("unknown kind `{raw}` for field `{}`", f.name))?,
                None => FieldKind::default(),
            };
            Ok(FieldSpec::new(f.name, kind))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let schema = Schema::new(d.delimiter, fields)?;

    let mode = if d.strict || strict_data {
        LoadMode::Strict
    } else {
        LoadMode::Lenient
    };

    let selection = d
        .selection
        .as_deref()
        .map(|raw| {
            raw.parse::<DatasetSelection>()
                .with_context(|| format!("unknown dataset selection `{raw}`"))
        })
        .transpose()?;

    let path = PathBuf::from(expand_env(&d.path, env)?);
    let path = if path.is_relative() {
        base_dir.join(path)
    } else {
        path
    };

    Ok((
        DatasetPlan {
            path,
            loader: DatasetLoader::new(schema, mode),
        },
        selection,
    ))
}

fn resolve_request(
    r: RequestYaml,
    schema: Option<&Schema>,
    env: &BTreeMap<String, String>,
) -> anyhow::Result<RequestPlan> {
    let method = r.method.as_deref().unwrap_or("GET").to_ascii_uppercase();
    let method = Method::from_bytes(method.as_bytes())
        .with_context(|| format!("invalid method `{method}`"))?;

    let url = Template::parse_url(&expand_env(&r.url, env)?, schema)?;

    let headers = r
        .headers
        .into_iter()
        .map(|(name, value)| -> anyhow::Result<(String, Template)> {
            let value = Template::parse(&expand_env(&value, env)?, schema)
                .with_context(|| format!("header `{name}`"))?;
            Ok((name, value))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let body = r
        .body
        .map(|b| -> anyhow::Result<Template> { Template::parse(&expand_env(&b, env)?, schema) })
        .transpose()
        .context("body")?;

    Ok(RequestPlan {
        method,
        url,
        headers,
        body,
        timeout: r.timeout.map(YamlDuration::into_inner),
    })
}

fn resolve_check(c: CheckYaml, has_list: bool, has_confirm: bool) -> anyhow::Result<CheckPlan> {
    let mut kinds = Vec::new();
    if let Some(status) = c.status {
        kinds.push(CheckKind::Status(status));
    }
    if let Some(max) = c.max_duration {
        kinds.push(CheckKind::MaxDuration(max.into_inner()));
    }
    if let Some(needle) = c.body_contains {
        kinds.push(CheckKind::BodyContains(needle));
    }
    if c.json {
        kinds.push(CheckKind::Json);
    }
    if c.list {
        if !has_list {
            anyhow::bail!("check `{}` uses `list` but the plan has no `list` section", c.name);
        }
        kinds.push(CheckKind::List);
    }
    if c.confirm {
        if !has_confirm {
            anyhow::bail!(
                "check `{}` uses `confirm` but the plan has no `confirm` section",
                c.name
            );
        }
        kinds.push(CheckKind::Confirm);
    }

    match kinds.len() {
        1 => Ok(CheckPlan {
            name: c.name,
            kind: kinds.remove(0),
        }),
        0 => anyhow::bail!("check `{}` has no condition", c.name),
        _ => anyhow::bail!("check `{}` must have exactly one condition", c.name),
    }
}

fn threshold_set(metric: String, exprs: ThresholdExprYaml) -> ThresholdSet {
    let items = match exprs {
        ThresholdExprYaml::One(expr) => vec![ThresholdItemYaml::Expr(expr)],
        ThresholdExprYaml::Many(items) => items,
    };

    items
        .into_iter()
        .fold(ThresholdSet::new(metric), |set, item| match item {
            ThresholdItemYaml::Expr(expr) => set.expr(expr),
            ThresholdItemYaml::Detailed {
                threshold,
                abort_on_fail: true,
            } => set.abort_expr(threshold),
            ThresholdItemYaml::Detailed { threshold, .. } => set.expr(threshold),
        })
}
