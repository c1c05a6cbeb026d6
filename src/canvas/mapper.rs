//! Normalization of raw Canvas records into internal shapes.
//!
//! Everything in this module is pure. Untrusted external JSON enters the
//! system here and nowhere else, so each field is narrowed explicitly and
//! a malformed record produces a [`CourseSkip`], never a panic or an
//! aborted sync.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::types::{RawCourse, RawEnrollment, RawProfile};

/// Maximum length of a cleaned syllabus before truncation.
const SYLLABUS_MAX_CHARS: usize = 5000;
const TRUNCATION_MARKER: char = '…';

/// Trailing semester/year convention: two-digit year, literal `se`, one
/// digit, at the very end of the code (`MXB202_24se2`).
static SEMESTER_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2})se(\d)$").expect("semester suffix pattern compiles"));

/// Same convention with its joining separator, for stripping from names.
static SEMESTER_SUFFIX_STRIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[_\s-]*\d{2}se\d$").expect("strip pattern compiles"));

static SECTION_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+section\s+\S+$").expect("section pattern compiles"));

static PAREN_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\([^)]*\)\s*$").expect("paren pattern compiles"));

/// Unit-code shape: a short letter prefix followed by digits, e.g. MXB202.
static CODE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]{2,6}\d{3,5}[A-Za-z]?$").expect("code pattern compiles"));

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern compiles"));

/// A course's teaching period parsed from its code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemesterYear {
    pub year: i32,
    pub semester: i32,
}

/// Why a fetched course was excluded from the sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseSkip {
    /// Record failed shape validation (missing id, wrong types).
    Malformed,
    /// Course workflow state is not `available`.
    NotAvailable,
    /// No enrollment in `active` state.
    NoActiveEnrollment,
    /// Neither name nor code present; nothing to display.
    Untitled,
}

impl std::fmt::Display for CourseSkip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CourseSkip::Malformed => write!(f, "malformed record"),
            CourseSkip::NotAvailable => write!(f, "course not available"),
            CourseSkip::NoActiveEnrollment => write!(f, "no active enrollment"),
            CourseSkip::Untitled => write!(f, "no usable title"),
        }
    }
}

/// A course normalized for persistence as a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedUnit {
    pub external_id: String,
    pub code: Option<String>,
    pub title: String,
    pub canvas_url: String,
    pub year: Option<i32>,
    pub semester: Option<i32>,
    pub role: String,
    pub syllabus: Option<String>,
}

/// A profile normalized for persistence as an account mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedProfile {
    pub external_id: String,
    pub name: Option<String>,
    pub short_name: Option<String>,
    pub sortable_name: Option<String>,
    pub avatar_url: Option<String>,
    pub primary_email: Option<String>,
    pub locale: Option<String>,
    pub calendar_url: Option<String>,
}

/// Parse the trailing `NNseS` convention from a course code.
///
/// Returns `None` for anything that does not match exactly at the end of
/// the string, for semesters other than 1 and 2, and for years outside
/// 2000-2099. Similar but non-conforming suffixes never partially match.
pub fn parse_semester_year(code: &str) -> Option<SemesterYear> {
    let captures = SEMESTER_SUFFIX.captures(code)?;

    let year = 2000 + captures[1].parse::<i32>().ok()?;
    let semester = captures[2].parse::<i32>().ok()?;

    if !(2000..=2099).contains(&year) || !(1..=2).contains(&semester) {
        return None;
    }

    Some(SemesterYear { year, semester })
}

/// Pick the course code: the explicit field when present, otherwise a
/// code-shaped token derived from the display name by stripping the
/// semester/year suffix, a `Section X` suffix and a trailing parenthetical,
/// in that order.
pub fn extract_course_code(course: &RawCourse) -> Option<String> {
    if let Some(code) = course.course_code.as_deref() {
        let trimmed = code.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }

    let name = course.name.as_deref()?.trim();
    let stripped = SEMESTER_SUFFIX_STRIP.replace(name, "");
    let stripped = SECTION_SUFFIX.replace(&stripped, "");
    let stripped = PAREN_SUFFIX.replace(&stripped, "");
    let stripped = stripped.trim();

    if stripped.is_empty() {
        return None;
    }

    let token = stripped.split_whitespace().next()?;
    CODE_TOKEN.is_match(token).then(|| token.to_string())
}

/// Remove a leading occurrence of the course code from a display title.
///
/// The match is case-insensitive and must be followed by whitespace. When
/// stripping would leave nothing (a title that *is* the code) or would not
/// change anything, the original title is returned unchanged.
pub fn clean_title(title: &str, code: &str) -> String {
    if code.is_empty() || title.len() <= code.len() || !title.is_char_boundary(code.len()) {
        return title.to_string();
    }

    let (head, tail) = title.split_at(code.len());
    if !head.eq_ignore_ascii_case(code) || !tail.starts_with(char::is_whitespace) {
        return title.to_string();
    }

    let cleaned = tail.trim_start();
    if cleaned.is_empty() {
        return title.to_string();
    }

    cleaned.to_string()
}

/// Choose which enrollment's role describes the course for this user.
///
/// Priority: active student, any active, any student, any enrollment,
/// fixed default. The order is load-bearing for multi-enrollment records.
pub fn pick_enrollment_role(course: &RawCourse) -> String {
    let enrollments = &course.enrollments;

    let picked: Option<&RawEnrollment> = enrollments
        .iter()
        .find(|e| e.is_student() && e.is_active())
        .or_else(|| enrollments.iter().find(|e| e.is_active()))
        .or_else(|| enrollments.iter().find(|e| e.is_student()))
        .or_else(|| enrollments.first());

    picked
        .and_then(|e| e.kind.clone())
        .unwrap_or_else(|| "student".to_string())
}

/// Courses are synced only when available and actively enrolled; anything
/// else is excluded entirely rather than persisted as inactive.
pub fn should_skip_course(course: &RawCourse) -> Option<CourseSkip> {
    let available = course
        .workflow_state
        .as_deref()
        .is_some_and(|state| state == "available");
    if !available {
        return Some(CourseSkip::NotAvailable);
    }

    if !course.enrollments.iter().any(RawEnrollment::is_active) {
        return Some(CourseSkip::NoActiveEnrollment);
    }

    None
}

/// Reduce a syllabus HTML blob to bounded plain text: tags removed, a
/// fixed entity list decoded, whitespace collapsed, truncated at
/// [`SYLLABUS_MAX_CHARS`] with a marker.
pub fn clean_syllabus_html(html: &str) -> String {
    let without_tags = HTML_TAG.replace_all(html, " ");

    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");

    let collapsed = decoded.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= SYLLABUS_MAX_CHARS {
        return collapsed;
    }

    let mut truncated: String = collapsed.chars().take(SYLLABUS_MAX_CHARS).collect();
    truncated.push(TRUNCATION_MARKER);
    truncated
}

/// Map one raw course value into a persistable unit.
///
/// Shape validation happens here (`serde` into [`RawCourse`]); any failure
/// is a skip, not an error, so one bad record cannot abort a sync.
pub fn map_course(base_url: &str, value: &serde_json::Value) -> Result<MappedUnit, CourseSkip> {
    let course: RawCourse =
        serde_json::from_value(value.clone()).map_err(|_| CourseSkip::Malformed)?;

    if let Some(skip) = should_skip_course(&course) {
        return Err(skip);
    }

    let code = extract_course_code(&course);
    let title = match (course.name.as_deref(), code.as_deref()) {
        (Some(name), Some(code)) => clean_title(name.trim(), code),
        (Some(name), None) => name.trim().to_string(),
        (None, Some(code)) => code.to_string(),
        (None, None) => return Err(CourseSkip::Untitled),
    };
    if title.is_empty() {
        return Err(CourseSkip::Untitled);
    }

    let period = code.as_deref().and_then(parse_semester_year);
    let syllabus = course
        .syllabus_body
        .as_deref()
        .map(clean_syllabus_html)
        .filter(|text| !text.is_empty());

    Ok(MappedUnit {
        external_id: course.id.to_string(),
        canvas_url: format!("{}/courses/{}", base_url.trim_end_matches('/'), course.id),
        role: pick_enrollment_role(&course),
        year: period.map(|p| p.year),
        semester: period.map(|p| p.semester),
        code,
        title,
        syllabus,
    })
}

/// Map the raw profile into a persistable account mirror.
pub fn map_profile(profile: &RawProfile) -> MappedProfile {
    let non_empty = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    MappedProfile {
        external_id: profile.id.to_string(),
        name: non_empty(&profile.name),
        short_name: non_empty(&profile.short_name),
        sortable_name: non_empty(&profile.sortable_name),
        avatar_url: non_empty(&profile.avatar_url),
        primary_email: non_empty(&profile.primary_email),
        locale: non_empty(&profile.locale),
        calendar_url: profile
            .calendar
            .as_ref()
            .and_then(|calendar| non_empty(&calendar.ics)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn course(value: serde_json::Value) -> RawCourse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn parse_semester_year_matches_convention() {
        assert_eq!(
            parse_semester_year("COMP1001_24se2"),
            Some(SemesterYear {
                year: 2024,
                semester: 2
            })
        );
        assert_eq!(
            parse_semester_year("X_99se1"),
            Some(SemesterYear {
                year: 2099,
                semester: 1
            })
        );
    }

    #[test]
    fn parse_semester_year_rejects_nonconforming_codes() {
        assert_eq!(parse_semester_year("COMP1001"), None);
        // invalid semester digit
        assert_eq!(parse_semester_year("X_00se3"), None);
        // suffix not at the end
        assert_eq!(parse_semester_year("X_24se2_extra"), None);
        // similar but non-conforming suffixes must not partially match
        assert_eq!(parse_semester_year("X_24see2"), None);
        assert_eq!(parse_semester_year("X_4se2"), None);
        assert_eq!(parse_semester_year(""), None);
    }

    #[test]
    fn extract_course_code_prefers_explicit_field() {
        let c = course(json!({
            "id": 1,
            "name": "Advanced Calculus",
            "course_code": "MXB202_25se2"
        }));
        assert_eq!(extract_course_code(&c), Some("MXB202_25se2".to_string()));
    }

    #[test]
    fn extract_course_code_derives_from_name() {
        let c = course(json!({ "id": 1, "name": "MXB202_25se2" }));
        assert_eq!(extract_course_code(&c), Some("MXB202".to_string()));

        let c = course(json!({ "id": 1, "name": "COMP1001 Section B" }));
        assert_eq!(extract_course_code(&c), Some("COMP1001".to_string()));

        let c = course(json!({ "id": 1, "name": "IFB104 (Semester 1 2025)" }));
        assert_eq!(extract_course_code(&c), Some("IFB104".to_string()));
    }

    #[test]
    fn extract_course_code_returns_none_when_nothing_usable() {
        let c = course(json!({ "id": 1, "name": "Study Skills Workshop" }));
        assert_eq!(extract_course_code(&c), None);

        let c = course(json!({ "id": 1, "name": "_25se1" }));
        assert_eq!(extract_course_code(&c), None);

        let c = course(json!({ "id": 1 }));
        assert_eq!(extract_course_code(&c), None);

        // whitespace-only explicit code falls through to the name
        let c = course(json!({ "id": 1, "course_code": "   ", "name": "MXB202_25se2" }));
        assert_eq!(extract_course_code(&c), Some("MXB202".to_string()));
    }

    #[test]
    fn clean_title_strips_leading_code() {
        assert_eq!(
            clean_title("MXB202_25se2 Advanced Calculus", "MXB202_25se2"),
            "Advanced Calculus"
        );
        assert_eq!(
            clean_title("mxb202_25se2 Advanced Calculus", "MXB202_25se2"),
            "Advanced Calculus"
        );
    }

    #[test]
    fn clean_title_leaves_code_only_titles_alone() {
        assert_eq!(clean_title("MXB202", "MXB202"), "MXB202");
        // code followed by only whitespace would strip to empty
        assert_eq!(clean_title("MXB202   ", "MXB202"), "MXB202   ");
    }

    #[test]
    fn clean_title_requires_whitespace_after_code() {
        assert_eq!(
            clean_title("MXB202Advanced Calculus", "MXB202"),
            "MXB202Advanced Calculus"
        );
    }

    #[test]
    fn clean_title_without_match_is_unchanged() {
        assert_eq!(
            clean_title("Advanced Calculus", "MXB202"),
            "Advanced Calculus"
        );
        assert_eq!(clean_title("Advanced Calculus", ""), "Advanced Calculus");
    }

    #[test]
    fn enrollment_role_priority_order() {
        // active student wins over earlier active teacher
        let c = course(json!({
            "id": 1,
            "enrollments": [
                { "type": "teacher", "enrollment_state": "active" },
                { "type": "student", "enrollment_state": "active" }
            ]
        }));
        assert_eq!(pick_enrollment_role(&c), "student");

        // no active student: first active wins
        let c = course(json!({
            "id": 1,
            "enrollments": [
                { "type": "student", "enrollment_state": "completed" },
                { "type": "ta", "enrollment_state": "active" }
            ]
        }));
        assert_eq!(pick_enrollment_role(&c), "ta");

        // no active at all: any student wins over first
        let c = course(json!({
            "id": 1,
            "enrollments": [
                { "type": "observer", "enrollment_state": "completed" },
                { "type": "student", "enrollment_state": "completed" }
            ]
        }));
        assert_eq!(pick_enrollment_role(&c), "student");

        // nothing matches any rule: first enrollment
        let c = course(json!({
            "id": 1,
            "enrollments": [
                { "type": "designer", "enrollment_state": "invited" }
            ]
        }));
        assert_eq!(pick_enrollment_role(&c), "designer");

        // no enrollments at all: fixed default
        let c = course(json!({ "id": 1 }));
        assert_eq!(pick_enrollment_role(&c), "student");
    }

    #[test]
    fn skip_predicate_requires_available_and_active() {
        let ok = course(json!({
            "id": 1,
            "workflow_state": "available",
            "enrollments": [{ "type": "student", "enrollment_state": "active" }]
        }));
        assert_eq!(should_skip_course(&ok), None);

        let unpublished = course(json!({
            "id": 1,
            "workflow_state": "unpublished",
            "enrollments": [{ "type": "student", "enrollment_state": "active" }]
        }));
        assert_eq!(should_skip_course(&unpublished), Some(CourseSkip::NotAvailable));

        let completed = course(json!({
            "id": 1,
            "workflow_state": "available",
            "enrollments": [{ "type": "student", "enrollment_state": "completed" }]
        }));
        assert_eq!(
            should_skip_course(&completed),
            Some(CourseSkip::NoActiveEnrollment)
        );

        let missing_state = course(json!({ "id": 1 }));
        assert_eq!(
            should_skip_course(&missing_state),
            Some(CourseSkip::NotAvailable)
        );
    }

    #[test]
    fn syllabus_cleanup_strips_tags_and_entities() {
        let html = "<h2>Welcome</h2><p>Read&nbsp;the &quot;guide&quot; &amp; notes.</p>";
        assert_eq!(
            clean_syllabus_html(html),
            "Welcome Read the \"guide\" & notes."
        );
    }

    #[test]
    fn syllabus_cleanup_collapses_whitespace() {
        assert_eq!(
            clean_syllabus_html("a\n\n   b\t\tc"),
            "a b c"
        );
        assert_eq!(clean_syllabus_html("<div><br/></div>"), "");
    }

    #[test]
    fn syllabus_cleanup_truncates_long_content() {
        let long = "word ".repeat(2000);
        let cleaned = clean_syllabus_html(&long);
        assert_eq!(cleaned.chars().count(), SYLLABUS_MAX_CHARS + 1);
        assert!(cleaned.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn map_course_produces_complete_unit() {
        let value = json!({
            "id": 4321,
            "name": "MXB202_25se2 Advanced Calculus",
            "course_code": "MXB202_25se2",
            "workflow_state": "available",
            "enrollments": [{ "type": "student", "enrollment_state": "active" }],
            "syllabus_body": "<p>Weekly problem sheets.</p>"
        });

        let unit = map_course("https://canvas.qut.edu.au", &value).unwrap();
        assert_eq!(unit.external_id, "4321");
        assert_eq!(unit.code.as_deref(), Some("MXB202_25se2"));
        assert_eq!(unit.title, "Advanced Calculus");
        assert_eq!(unit.canvas_url, "https://canvas.qut.edu.au/courses/4321");
        assert_eq!(unit.year, Some(2025));
        assert_eq!(unit.semester, Some(2));
        assert_eq!(unit.role, "student");
        assert_eq!(unit.syllabus.as_deref(), Some("Weekly problem sheets."));
    }

    #[test]
    fn map_course_skips_record_without_id() {
        let value = json!({ "name": "Mystery course", "workflow_state": "available" });
        assert_eq!(
            map_course("https://canvas.qut.edu.au", &value),
            Err(CourseSkip::Malformed)
        );
    }

    #[test]
    fn map_course_skips_non_object_values() {
        assert_eq!(
            map_course("https://canvas.qut.edu.au", &json!("not a course")),
            Err(CourseSkip::Malformed)
        );
        assert_eq!(
            map_course("https://canvas.qut.edu.au", &json!(null)),
            Err(CourseSkip::Malformed)
        );
    }

    #[test]
    fn map_course_title_falls_back_to_code() {
        let value = json!({
            "id": 9,
            "course_code": "EGB111",
            "workflow_state": "available",
            "enrollments": [{ "type": "student", "enrollment_state": "active" }]
        });
        let unit = map_course("https://canvas.qut.edu.au", &value).unwrap();
        assert_eq!(unit.title, "EGB111");
    }

    #[test]
    fn map_profile_narrows_empty_strings_to_none() {
        let profile: RawProfile = serde_json::from_value(json!({
            "id": 77,
            "name": "  Jess Chen ",
            "short_name": "",
            "primary_email": "jess@example.edu",
            "calendar": { "ics": "https://canvas.qut.edu.au/feeds/calendars/user_abc.ics" }
        }))
        .unwrap();

        let mapped = map_profile(&profile);
        assert_eq!(mapped.external_id, "77");
        assert_eq!(mapped.name.as_deref(), Some("Jess Chen"));
        assert_eq!(mapped.short_name, None);
        assert_eq!(
            mapped.calendar_url.as_deref(),
            Some("https://canvas.qut.edu.au/feeds/calendars/user_abc.ics")
        );
    }
}
