use crate::error::{Error, Result};

/// Threshold expressions attached to one metric, as declared in a plan.
#[derive(Debug, Clone)]
pub struct ThresholdSet {
    pub metric: String,
    pub expressions: Vec<ThresholdDef>,
}

impl ThresholdSet {
    pub fn new(metric: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            expressions: Vec::new(),
        }
    }

    #[must_use]
    pub fn expr(mut self, expression: impl Into<String>) -> Self {
        self.expressions.push(ThresholdDef {
            expression: expression.into(),
            abort_on_fail: false,
        });
        self
    }

    /// Adds an expression that stops the run as soon as it is observed failing.
    #[must_use]
    pub fn abort_expr(mut self, expression: impl Into<String>) -> Self {
        self.expressions.push(ThresholdDef {
            expression: expression.into(),
            abort_on_fail: true,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdDef {
    pub expression: String,
    pub abort_on_fail: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, serde::Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Evaluated at the end of the run only.
    Fail,
    /// Also evaluated while the run is in progress; a failure stops the run.
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Ne,
}

impl ThresholdOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }

    pub fn compare(self, observed: f64, target: f64) -> bool {
        match self {
            Self::Lt => observed < target,
            Self::Lte => observed <= target,
            Self::Gt => observed > target,
            Self::Gte => observed >= target,
            Self::Eq => observed == target,
            Self::Ne => observed != target,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdAgg {
    Avg,
    Min,
    Max,
    Med,
    Count,
    Sum,
    Rate,
    P(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdExpr {
    pub agg: ThresholdAgg,
    pub op: ThresholdOp,
    pub value: f64,
}

/// A parsed threshold, ready for evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdRule {
    pub metric: String,
    /// Expression as written.
    pub source: String,
    pub expr: ThresholdExpr,
    pub severity: Severity,
}

pub fn parse_threshold_expr(raw: &str) -> std::result::Result<ThresholdExpr, String> {
    let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return Err("empty threshold".to_string());
    }

    // Two-character operators first so `<=` is not read as `<`.
    let ops = [
        ("<=", ThresholdOp::Lte),
        (">=", ThresholdOp::Gte),
        ("==", ThresholdOp::Eq),
        ("!=", ThresholdOp::Ne),
        ("<", ThresholdOp::Lt),
        (">", ThresholdOp::Gt),
    ];
    let (op_pos, op_len, op) = ops
        .iter()
        .find_map(|(tok, op)| s.find(tok).map(|pos| (pos, tok.len(), *op)))
        .ok_or_else(|| format!("missing operator in `{raw}`"))?;

    let (left, right_with_op) = s.split_at(op_pos);
    let right = &right_with_op[op_len..];
    if left.is_empty() || right.is_empty() {
        return Err(format!("incomplete threshold `{raw}`"));
    }

    let agg = parse_agg(left)?;

    let value: f64 = right
        .parse()
        .map_err(|_| format!("invalid numeric value `{right}`"))?;
    if !value.is_finite() {
        return Err(format!("threshold value `{right}` is not finite"));
    }

    Ok(ThresholdExpr { agg, op, value })
}

fn parse_agg(left: &str) -> std::result::Result<ThresholdAgg, String> {
    let agg = match left.to_ascii_lowercase().as_str() {
        "avg" => ThresholdAgg::Avg,
        "min" => ThresholdAgg::Min,
        "max" => ThresholdAgg::Max,
        "med" => ThresholdAgg::Med,
        "count" => ThresholdAgg::Count,
        "sum" => ThresholdAgg::Sum,
        "rate" => ThresholdAgg::Rate,
        other => {
            let Some(inner) = other.strip_prefix("p(").and_then(|v| v.strip_suffix(')')) else {
                return Err(format!("unknown aggregation `{left}`"));
            };
            let p: f64 = inner
                .parse()
                .map_err(|_| format!("invalid percentile `{inner}`"))?;
            if !(0.0..=100.0).contains(&p) {
                return Err(format!("percentile {inner} out of range 0..=100"));
            }
            ThresholdAgg::P(p)
        }
    };
    Ok(agg)
}

/// Parses every expression of every set. The first invalid expression fails the whole call.
pub fn parse_rules(sets: &[ThresholdSet]) -> Result<Vec<ThresholdRule>> {
    let mut rules = Vec::new();
    for set in sets {
        for def in &set.expressions {
            let expr =
                parse_threshold_expr(&def.expression).map_err(|reason| Error::InvalidThreshold {
                    metric: set.metric.clone(),
                    expression: def.expression.clone(),
                    reason,
                })?;
            rules.push(ThresholdRule {
                metric: set.metric.clone(),
                source: def.expression.clone(),
                expr,
                severity: if def.abort_on_fail {
                    Severity::Abort
                } else {
                    Severity::Fail
                },
            });
        }
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_threshold_expr_trims_whitespace() {
        let expr = parse_threshold_expr("  avg  <=  123  ").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(expr.agg, ThresholdAgg::Avg);
        assert_eq!(expr.op, ThresholdOp::Lte);
        assert_eq!(expr.value, 123.0);
    }

    #[test]
    fn parse_threshold_expr_rejects_out_of_range_percentiles() {
        let err = match parse_threshold_expr("p(101)<1") {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert!(err.contains("out of range"), "{err}");
    }

    #[test]
    fn fractional_percentiles_and_all_operators() {
        let expr = parse_threshold_expr("p(99.9)<2000").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(expr.agg, ThresholdAgg::P(99.9));

        for (raw, op) in [
            ("rate<1", ThresholdOp::Lt),
            ("rate<=1", ThresholdOp::Lte),
            ("rate>1", ThresholdOp::Gt),
            ("rate>=1", ThresholdOp::Gte),
            ("rate==1", ThresholdOp::Eq),
            ("rate!=1", ThresholdOp::Ne),
        ] {
            let parsed = parse_threshold_expr(raw).unwrap_or_else(|e| panic!("{raw}: {e}"));
            assert_eq!(parsed.op, op, "{raw}");
        }
    }

    #[test]
    fn parse_threshold_expr_rejects_garbage() {
        for raw in ["", "avg", "avg<", "<5", "mean<5", "avg<abc", "p(x)<1", "avg<NaN"] {
            assert!(parse_threshold_expr(raw).is_err(), "{raw} should not parse");
        }
    }

    #[test]
    fn parse_rules_carries_severity_and_reports_the_bad_expression() {
        let sets = vec![
            ThresholdSet::new("http_req_duration")
                .expr("p(95)<500")
                .abort_expr("max<5000"),
        ];
        let rules = parse_rules(&sets).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].severity, Severity::Fail);
        assert_eq!(rules[1].severity, Severity::Abort);
        assert_eq!(rules[1].source, "max<5000");

        let bad = vec![ThresholdSet::new("checks").expr("rate>>1")];
        assert!(matches!(
            parse_rules(&bad),
            Err(Error::InvalidThreshold { metric, .. }) if metric == "checks"
        ));
    }
}
