use crate::ipc::error::ApiError;
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashSet;

/// Canonical form used for every class-name comparison: trimmed, upper-cased,
/// runs of whitespace collapsed to a single space. `None`/blank input
/// canonicalizes to the empty string, which never matches any scope.
pub fn normalize_class_name(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return String::new();
    };
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Decoded form of the legacy `coordinator_class` column, which stores either
/// a plain class name or a JSON-encoded array of names (director multi-class).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassAssignment {
    None,
    Single(String),
    Multiple(Vec<String>),
}

pub fn decode_coordinator_class(raw: Option<&str>) -> ClassAssignment {
    let Some(raw) = raw else {
        return ClassAssignment::None;
    };
    let t = raw.trim();
    if t.is_empty() {
        return ClassAssignment::None;
    }
    if t.starts_with('[') {
        if let Ok(names) = serde_json::from_str::<Vec<String>>(t) {
            let names: Vec<String> = names
                .into_iter()
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .collect();
            if names.is_empty() {
                return ClassAssignment::None;
            }
            return ClassAssignment::Multiple(names);
        }
        // Not valid JSON after all; fall through and treat it as a name.
    }
    ClassAssignment::Single(t.to_string())
}

impl ClassAssignment {
    pub fn names(&self) -> Vec<&str> {
        match self {
            ClassAssignment::None => Vec::new(),
            ClassAssignment::Single(n) => vec![n.as_str()],
            ClassAssignment::Multiple(ns) => ns.iter().map(|n| n.as_str()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Department {
    ClassTeacher,
    Coordinator,
    SubjectTeacher,
    Director,
}

impl Department {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "class_teacher" => Some(Department::ClassTeacher),
            "coordinator" => Some(Department::Coordinator),
            "subject_teacher" => Some(Department::SubjectTeacher),
            "director" => Some(Department::Director),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Department::ClassTeacher => "class_teacher",
            Department::Coordinator => "coordinator",
            Department::SubjectTeacher => "subject_teacher",
            Department::Director => "director",
        }
    }

    /// Departments allowed to use the class-teacher endpoint family.
    pub fn leads_class(self) -> bool {
        matches!(
            self,
            Department::ClassTeacher | Department::Coordinator | Department::Director
        )
    }
}

/// The set of classes a teacher may act on. Original casing is kept for
/// display (first occurrence wins); all membership tests go through the
/// normalized set.
#[derive(Debug, Clone, Default)]
pub struct TeacherScope {
    pub classes: Vec<String>,
    normalized: HashSet<String>,
}

impl TeacherScope {
    pub fn add(&mut self, name: &str) {
        let norm = normalize_class_name(Some(name));
        if norm.is_empty() {
            return;
        }
        if self.normalized.insert(norm) {
            self.classes.push(name.trim().to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }

    pub fn contains(&self, raw_class_name: Option<&str>) -> bool {
        let norm = normalize_class_name(raw_class_name);
        !norm.is_empty() && self.normalized.contains(&norm)
    }

    pub fn normalized_names(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.normalized.iter().map(|s| s.as_str()).collect();
        out.sort_unstable();
        out
    }
}

/// Derives the teacher's department and assigned-class scope: the union of
/// `classes_json` across their subject rows (restricted to subjects of their
/// own school), plus the decoded coordinator assignment for class-leading
/// departments.
pub fn resolve_teacher_scope(
    conn: &Connection,
    teacher_user_id: &str,
) -> Result<(Department, TeacherScope), ApiError> {
    let row: Option<(String, Option<String>)> = conn
        .query_row(
            "SELECT department, coordinator_class FROM teacher_profiles WHERE user_id = ?",
            [teacher_user_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((department_raw, coordinator_class)) = row else {
        return Err(ApiError::not_found("teacher profile not found"));
    };
    let Some(department) = Department::parse(&department_raw) else {
        tracing::error!(teacher_user_id, department = %department_raw, "unknown department at rest");
        return Err(ApiError::internal("unknown teacher department"));
    };

    let mut scope = TeacherScope::default();

    let mut stmt = conn.prepare(
        "SELECT ts.classes_json
         FROM teacher_subjects ts
         JOIN subjects sub ON sub.id = ts.subject_id
         JOIN users u ON u.id = ts.teacher_id
         WHERE ts.teacher_id = ? AND sub.school_id = u.school_id",
    )?;
    let rows: Vec<String> = stmt
        .query_map([teacher_user_id], |r| r.get(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    for classes_json in rows {
        match serde_json::from_str::<Vec<String>>(&classes_json) {
            Ok(names) => {
                for name in names {
                    scope.add(&name);
                }
            }
            Err(e) => {
                tracing::warn!(teacher_user_id, error = %e, "skipping malformed classes_json row");
            }
        }
    }

    if department.leads_class() {
        for name in decode_coordinator_class(coordinator_class.as_deref()).names() {
            scope.add(name);
        }
    }

    Ok((department, scope))
}

#[derive(Debug, Clone)]
pub struct RosterStudent {
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub class_name: String,
    pub student_no: Option<String>,
}

impl RosterStudent {
    pub fn display_name(&self) -> String {
        format!("{}, {}", self.last_name, self.first_name)
    }
}

/// Loads the active students of a school that fall inside the given scope.
/// The store pre-filters on the write-time canonical column (NULL rows pass,
/// since rows written before canonicalization carry arbitrary casing); the
/// normalizer then decides membership for every row in application code.
pub fn scoped_students(
    conn: &Connection,
    school_id: &str,
    scope: &TeacherScope,
) -> Result<Vec<RosterStudent>, ApiError> {
    if scope.is_empty() {
        // Never issue an empty IN list; an empty scope is an empty roster.
        return Ok(Vec::new());
    }
    let names = scope.normalized_names();
    let placeholders = vec!["?"; names.len()].join(", ");
    let sql = format!(
        "SELECT u.id, u.first_name, u.last_name, sp.class_name, sp.student_no
         FROM users u
         JOIN student_profiles sp ON sp.user_id = u.id
         WHERE u.school_id = ? AND u.role = 'student' AND u.active = 1
           AND (sp.class_name_canonical IN ({}) OR sp.class_name_canonical IS NULL)
         ORDER BY u.last_name, u.first_name",
        placeholders
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut params: Vec<&str> = Vec::with_capacity(names.len() + 1);
    params.push(school_id);
    params.extend(names);
    let rows: Vec<RosterStudent> = stmt
        .query_map(rusqlite::params_from_iter(params), |r| {
            Ok(RosterStudent {
                user_id: r.get(0)?,
                first_name: r.get(1)?,
                last_name: r.get(2)?,
                class_name: r.get::<_, Option<String>>(3)?.unwrap_or_default(),
                student_no: r.get(4)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows
        .into_iter()
        .filter(|s| scope.contains(Some(&s.class_name)))
        .collect())
}

/// Scope membership check for a single student of the school. Returns the
/// roster row when in scope; `None` covers both absent and out-of-scope so
/// callers can map it straight to not_found.
pub fn scoped_student(
    conn: &Connection,
    school_id: &str,
    scope: &TeacherScope,
    student_user_id: &str,
) -> Result<Option<RosterStudent>, ApiError> {
    let row: Option<RosterStudent> = conn
        .query_row(
            "SELECT u.id, u.first_name, u.last_name, sp.class_name, sp.student_no
             FROM users u
             JOIN student_profiles sp ON sp.user_id = u.id
             WHERE u.id = ? AND u.school_id = ? AND u.role = 'student' AND u.active = 1",
            [student_user_id, school_id],
            |r| {
                Ok(RosterStudent {
                    user_id: r.get(0)?,
                    first_name: r.get(1)?,
                    last_name: r.get(2)?,
                    class_name: r.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    student_no: r.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(row.filter(|s| scope.contains(Some(&s.class_name))))
}
