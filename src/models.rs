use serde::{Deserialize, Serialize};

use crate::risk::RiskLevel;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StudentSummaryRecord {
    pub student_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub major: Option<String>,
    #[serde(default, deserialize_with = "de::opt_integer")]
    pub cohort_year: Option<i64>,
    #[serde(default)]
    pub gpa: Option<f64>,
    #[serde(default)]
    pub total_credits: Option<f64>,
    #[serde(default)]
    pub avg_attendance: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_integer")]
    pub dfw_count: Option<i64>,
    #[serde(default)]
    pub credits_attempted: Option<f64>,
}

impl StudentSummaryRecord {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.student_id)
    }
}

/// Present only for students the backend currently flags as at-risk.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RiskRecord {
    pub student_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRiskRow {
    pub student: StudentSummaryRecord,
    pub score: Option<f64>,
    pub score_display: String,
    pub flags: Vec<String>,
    pub risk: RiskLevel,
}

/// Row shape shared by `/api/metrics/pass-rates` and `/api/metrics/dfw-rates`;
/// each endpoint fills only its own rate.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CourseRateRecord {
    pub course_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default, deserialize_with = "de::opt_integer")]
    pub level: Option<i64>,
    #[serde(default)]
    pub pass_rate: Option<f64>,
    #[serde(default)]
    pub dfw_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseMetricRecord {
    pub course_id: String,
    pub title: String,
    pub department: String,
    pub level: Option<i64>,
    pub pass_rate: f64,
    pub dfw_rate: f64,
}

/// A course row enriched with its prerequisite list (empty when the graph has
/// no entry for it).
#[derive(Debug, Clone, PartialEq)]
pub struct CourseCatalogRow {
    pub course: CourseMetricRecord,
    pub prerequisites: Vec<PrerequisiteRef>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CohortPoint {
    #[serde(deserialize_with = "de::integer")]
    pub cohort_year: i64,
    #[serde(default)]
    pub mean: Option<f64>,
    #[serde(default)]
    pub median: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_integer")]
    pub count: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PrerequisiteEntry {
    pub course_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub prerequisites: Vec<PrerequisiteRef>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawPrerequisite")]
pub struct PrerequisiteRef {
    pub course_id: String,
    pub title: Option<String>,
}

// The graph endpoint has emitted objects, `[id, title]` pairs and bare ids.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawPrerequisite {
    Object {
        course_id: String,
        #[serde(default)]
        title: Option<String>,
    },
    Pair(String, Option<String>),
    Bare(String),
}

impl From<RawPrerequisite> for PrerequisiteRef {
    fn from(raw: RawPrerequisite) -> Self {
        match raw {
            RawPrerequisite::Object { course_id, title } | RawPrerequisite::Pair(course_id, title) => {
                PrerequisiteRef { course_id, title }
            }
            RawPrerequisite::Bare(course_id) => PrerequisiteRef {
                course_id,
                title: None,
            },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StudentEnrollments {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub enrollments: Vec<Enrollment>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Enrollment {
    #[serde(default, deserialize_with = "de::opt_text")]
    pub term: Option<String>,
    pub course_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub grade: Option<f64>,
    #[serde(default)]
    pub attendance_pct: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentUser {
    pub username: String,
    #[serde(default)]
    pub role: Option<String>,
}

/// Lenient decoders for columns the backend serialises from dataframes, where
/// integers sometimes arrive as floats (`2023.0`) or strings.
mod de {
    use serde::{de::Error, Deserialize, Deserializer};
    use serde_json::Value;

    pub fn opt_integer<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        let value = Option::<Value>::deserialize(d)?;
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(other) => as_integer(&other)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("expected an integer, got {other}"))),
        }
    }

    pub fn integer<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        let value = Value::deserialize(d)?;
        as_integer(&value)
            .ok_or_else(|| D::Error::custom(format!("expected an integer, got {value}")))
    }

    pub fn opt_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        let value = Option::<Value>::deserialize(d)?;
        Ok(match value {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(other) => Some(other.to_string()),
        })
    }

    fn as_integer(value: &Value) -> Option<i64> {
        match value {
            Value::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.is_finite())
                    .map(|f| f as i64)
            }),
            Value::String(s) => s.trim().parse::<f64>().ok().and_then(|f| {
                if f.fract() == 0.0 && f.is_finite() {
                    Some(f as i64)
                } else {
                    None
                }
            }),
            _ => None,
        }
    }
}
