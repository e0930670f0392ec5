use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn now_ts() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("schoolhub.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    // Bounded wait on locked writes; past this the request maps to a timeout error.
    conn.busy_timeout(Duration::from_secs(10))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schools(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            role TEXT NOT NULL,
            email TEXT NOT NULL,
            username TEXT NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            password_salt TEXT NOT NULL,
            password_digest TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id),
            UNIQUE(school_id, email),
            UNIQUE(school_id, username)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_users_school_role ON users(school_id, role)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions(
            token TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;

    // class_name keeps the operator's original casing for display;
    // class_name_canonical carries the normalized form, written whenever the
    // profile is written.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_profiles(
            user_id TEXT PRIMARY KEY,
            class_name TEXT,
            class_name_canonical TEXT,
            student_no TEXT,
            parent_name TEXT,
            parent_phone TEXT,
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_profiles_class ON student_profiles(class_name_canonical)",
        [],
    )?;

    // coordinator_class is a legacy overloaded column: either a plain class
    // name or a JSON-encoded array of names (director multi-class). It is
    // decoded into a ClassAssignment at read time, never parsed ad hoc.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS teacher_profiles(
            user_id TEXT PRIMARY KEY,
            department TEXT NOT NULL,
            coordinator_class TEXT,
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            name TEXT NOT NULL,
            code TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id),
            UNIQUE(school_id, code)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teacher_subjects(
            id TEXT PRIMARY KEY,
            teacher_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            classes_json TEXT NOT NULL,
            FOREIGN KEY(teacher_id) REFERENCES users(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            UNIQUE(teacher_id, subject_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_teacher_subjects_teacher ON teacher_subjects(teacher_id)",
        [],
    )?;

    // percentage is derived and clamped at write time, never recomputed.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            school_id TEXT NOT NULL,
            term INTEGER NOT NULL,
            academic_year TEXT NOT NULL,
            score REAL NOT NULL,
            max_score REAL NOT NULL,
            percentage REAL NOT NULL,
            assessment_date TEXT,
            recorded_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES users(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_student_term ON grades(student_id, academic_year, term)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            school_id TEXT NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            marked_by TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES users(id),
            UNIQUE(student_id, date)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student_date ON attendance(student_id, date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignments(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            subject_id TEXT,
            title TEXT NOT NULL,
            classes_json TEXT NOT NULL,
            due_date TEXT NOT NULL,
            max_score REAL NOT NULL,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignment_submissions(
            id TEXT PRIMARY KEY,
            assignment_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            submitted_at TEXT NOT NULL,
            score REAL,
            is_late INTEGER NOT NULL DEFAULT 0,
            graded_at TEXT,
            FOREIGN KEY(assignment_id) REFERENCES assignments(id),
            FOREIGN KEY(student_id) REFERENCES users(id),
            UNIQUE(assignment_id, student_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_alerts(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            school_id TEXT NOT NULL,
            created_by TEXT NOT NULL,
            alert_type TEXT NOT NULL,
            priority TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            follow_up_date TEXT,
            created_at TEXT NOT NULL,
            resolved_at TEXT,
            resolved_by TEXT,
            FOREIGN KEY(student_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_alerts_school_status ON student_alerts(school_id, status)",
        [],
    )?;

    // user_id NULL means a school-scoped broadcast addressed to admins.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS notifications(
            id TEXT PRIMARY KEY,
            user_id TEXT,
            school_id TEXT NOT NULL,
            type TEXT NOT NULL,
            priority TEXT NOT NULL DEFAULT 'normal',
            title TEXT NOT NULL,
            body TEXT NOT NULL,
            is_read INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, is_read)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS messages(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            sender_id TEXT NOT NULL,
            recipient_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            body TEXT NOT NULL,
            is_read INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            FOREIGN KEY(sender_id) REFERENCES users(id),
            FOREIGN KEY(recipient_id) REFERENCES users(id)
        )",
        [],
    )?;

    // Explicit academic calendar; the current term for a school is resolved
    // by date lookup instead of being derived from the wall-clock month.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS academic_terms(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            academic_year TEXT NOT NULL,
            term INTEGER NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id),
            UNIQUE(school_id, academic_year, term)
        )",
        [],
    )?;

    Ok(conn)
}
