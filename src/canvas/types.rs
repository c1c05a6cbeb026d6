//! Raw Canvas API response shapes.
//!
//! These structs deserialize defensively: only the numeric id is required,
//! everything else is optional or defaulted so a single odd record cannot
//! poison a whole page. Field narrowing beyond shape (state values, code
//! conventions) happens in the mapper.

use serde::{Deserialize, Serialize};

/// `GET /api/v1/users/self/profile`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawProfile {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub sortable_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub primary_email: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub calendar: Option<RawCalendar>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCalendar {
    #[serde(default)]
    pub ics: Option<String>,
}

/// One element of `GET /api/v1/courses`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCourse {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub course_code: Option<String>,
    #[serde(default)]
    pub workflow_state: Option<String>,
    #[serde(default)]
    pub enrollments: Vec<RawEnrollment>,
    #[serde(default)]
    pub syllabus_body: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEnrollment {
    /// Canvas enrollment type, e.g. `"student"`, `"teacher"`.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub enrollment_state: Option<String>,
}

impl RawEnrollment {
    pub fn is_student(&self) -> bool {
        self.kind
            .as_deref()
            .is_some_and(|k| k.eq_ignore_ascii_case("student"))
    }

    pub fn is_active(&self) -> bool {
        self.enrollment_state
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("active"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn course_with_only_id_deserializes() {
        let course: RawCourse = serde_json::from_value(serde_json::json!({ "id": 42 })).unwrap();
        assert_eq!(course.id, 42);
        assert!(course.name.is_none());
        assert!(course.enrollments.is_empty());
    }

    #[test]
    fn course_without_id_is_rejected() {
        let result: Result<RawCourse, _> =
            serde_json::from_value(serde_json::json!({ "name": "No id here" }));
        assert!(result.is_err());
    }

    #[test]
    fn enrollment_type_field_maps_to_kind() {
        let enrollment: RawEnrollment = serde_json::from_value(serde_json::json!({
            "type": "student",
            "enrollment_state": "active"
        }))
        .unwrap();
        assert!(enrollment.is_student());
        assert!(enrollment.is_active());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let profile: RawProfile = serde_json::from_value(serde_json::json!({
            "id": 7,
            "name": "Student",
            "integration_id": null,
            "time_zone": "Australia/Brisbane"
        }))
        .unwrap();
        assert_eq!(profile.id, 7);
    }
}
