use serde::Serialize;

pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Unweighted arithmetic mean of grade percentages; each assessment counts
/// once regardless of its max score. Empty input reports 0, never NaN.
pub fn overall_average(percentages: &[f64]) -> f64 {
    if percentages.is_empty() {
        return 0.0;
    }
    round1(percentages.iter().sum::<f64>() / percentages.len() as f64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

impl AttendanceStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "present" => Some(AttendanceStatus::Present),
            "absent" => Some(AttendanceStatus::Absent),
            "late" => Some(AttendanceStatus::Late),
            "excused" => Some(AttendanceStatus::Excused),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
            AttendanceStatus::Excused => "excused",
        }
    }

    /// Late still counts as attended for rate purposes.
    pub fn counts_attended(self) -> bool {
        matches!(self, AttendanceStatus::Present | AttendanceStatus::Late)
    }
}

pub fn attendance_rate(records: &[AttendanceStatus]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    let attended = records.iter().filter(|s| s.counts_attended()).count();
    round1(100.0 * attended as f64 / records.len() as f64)
}

/// Caller pre-filters `assigned` to assignments targeting the student's class.
pub fn assignment_completion(assigned: usize, submitted: usize) -> f64 {
    if assigned == 0 {
        return 0.0;
    }
    round1(100.0 * submitted as f64 / assigned as f64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Stable,
    Declining,
}

/// Single-term view: no prior term to compare against, so only the absolute
/// level distinguishes stable from declining.
pub fn trend_single(average: f64) -> Trend {
    if average >= 50.0 {
        Trend::Stable
    } else {
        Trend::Declining
    }
}

/// Term-over-term view: a move of more than 5 points either way breaks
/// stable.
pub fn trend_between(current: f64, previous: f64) -> Trend {
    let delta = current - previous;
    if delta > 5.0 {
        Trend::Improving
    } else if delta < -5.0 {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Excellent,
    Good,
    Average,
    Poor,
    AtRisk,
}

/// Banding by average, with at_risk overriding every band when the average
/// falls below 50 or attendance below 75.
pub fn classify(average: f64, attendance_rate: f64) -> Classification {
    if average < 50.0 || attendance_rate < 75.0 {
        return Classification::AtRisk;
    }
    if average >= 80.0 {
        Classification::Excellent
    } else if average >= 70.0 {
        Classification::Good
    } else if average >= 60.0 {
        Classification::Average
    } else {
        Classification::Poor
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentMetrics {
    pub student_id: String,
    pub display_name: String,
    pub class_name: String,
    pub overall_average: f64,
    pub attendance_rate: f64,
    pub assignment_completion: f64,
    pub grade_count: usize,
    pub trend: Trend,
    pub classification: Classification,
}

pub fn student_metrics(
    student_id: String,
    display_name: String,
    class_name: String,
    grade_percentages: &[f64],
    attendance: &[AttendanceStatus],
    assignments_assigned: usize,
    assignments_submitted: usize,
) -> StudentMetrics {
    let average = overall_average(grade_percentages);
    let rate = attendance_rate(attendance);
    StudentMetrics {
        student_id,
        display_name,
        class_name,
        overall_average: average,
        attendance_rate: rate,
        assignment_completion: assignment_completion(assignments_assigned, assignments_submitted),
        grade_count: grade_percentages.len(),
        trend: trend_single(average),
        classification: classify(average, rate),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSummary {
    pub student_count: usize,
    pub class_average: f64,
    pub average_attendance: f64,
    pub at_risk_count: usize,
}

/// Class-level reduction over per-student metrics.
pub fn class_summary(per_student: &[StudentMetrics]) -> ClassSummary {
    let n = per_student.len();
    if n == 0 {
        return ClassSummary {
            student_count: 0,
            class_average: 0.0,
            average_attendance: 0.0,
            at_risk_count: 0,
        };
    }
    let class_average =
        round1(per_student.iter().map(|m| m.overall_average).sum::<f64>() / n as f64);
    let average_attendance =
        round1(per_student.iter().map(|m| m.attendance_rate).sum::<f64>() / n as f64);
    let at_risk_count = per_student
        .iter()
        .filter(|m| m.classification == Classification::AtRisk)
        .count();
    ClassSummary {
        student_count: n,
        class_average,
        average_attendance,
        at_risk_count,
    }
}
