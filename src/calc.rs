use serde::Serialize;
use std::collections::HashMap;

/// Category applied when an assignment carries no category label.
pub const DEFAULT_CATEGORY: &str = "Homework";

/// 1-decimal display rounding: `Int(10*x + 0.5) / 10`.
/// Callers round for display only; stored and intermediate values stay full
/// precision.
pub fn round_display_1dp(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub id: String,
    pub category: Option<String>,
    pub max_points: f64,
}

impl Assignment {
    /// Resolved category label. Blank or missing falls back to
    /// [`DEFAULT_CATEGORY`].
    pub fn category_label(&self) -> &str {
        match self.category.as_deref() {
            Some(c) if !c.trim().is_empty() => c,
            _ => DEFAULT_CATEGORY,
        }
    }
}

/// One recorded score. At most one record exists per (student, assignment)
/// pair; the store enforces that with upserts and this module assumes it. A
/// record with `score = 0.0` is a real mark; the absence of a record means
/// "no submission" and is not counted at all.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeRecord {
    pub student_id: String,
    pub assignment_id: String,
    pub score: f64,
}

/// Per-class weight configuration: category name -> weight percent.
///
/// Keys match assignment categories exactly (case-sensitive, no trimming or
/// fuzzy matching). Weights need not sum to 100; the average renormalizes by
/// the weight actually used. A category graded but absent from the map
/// contributes zero weight.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryWeights {
    entries: HashMap<String, f64>,
}

impl CategoryWeights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            entries: pairs.into_iter().map(|(k, w)| (k.into(), w)).collect(),
        }
    }

    pub fn set(&mut self, category: impl Into<String>, weight: f64) {
        self.entries.insert(category.into(), weight);
    }

    pub fn get(&self, category: &str) -> Option<f64> {
        self.entries.get(category).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(k, w)| (k.as_str(), *w))
    }

    pub fn total(&self) -> f64 {
        self.entries.values().sum()
    }
}

/// Default per-class weight policy used to seed a class that has no stored
/// configuration. Callers apply this before invoking the aggregator; the
/// aggregator itself only ever consumes the map it is handed.
pub fn default_category_weights() -> CategoryWeights {
    CategoryWeights::from_pairs([
        ("Homework", 20.0),
        ("Test", 30.0),
        ("Midterm Exam", 20.0),
        ("End Semester Exam", 30.0),
    ])
}

/// Raw earned/max accumulator for one category.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CategoryTotals {
    pub earned: f64,
    pub max: f64,
}

/// One row of the per-category view for a student profile.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBreakdown {
    pub category: String,
    /// Configured weight percent; `None` when the category is graded but not
    /// declared in the weight map (it then carries zero weight).
    pub weight: Option<f64>,
    pub earned: f64,
    pub max: f64,
    /// `earned / max * 100`; `None` when nothing is graded in the category.
    pub percent: Option<f64>,
}

fn accumulate(
    student_id: &str,
    assignments: &[Assignment],
    grades: &[GradeRecord],
    weights: &CategoryWeights,
) -> HashMap<String, CategoryTotals> {
    let mut totals: HashMap<String, CategoryTotals> = HashMap::new();
    for (category, _) in weights.iter() {
        totals.insert(category.to_string(), CategoryTotals::default());
    }

    let by_id: HashMap<&str, &Assignment> =
        assignments.iter().map(|a| (a.id.as_str(), a)).collect();

    for g in grades {
        if g.student_id != student_id {
            continue;
        }
        // A grade pointing at an assignment outside the evaluated set is
        // skipped; one bad record never fails the whole computation.
        let Some(assignment) = by_id.get(g.assignment_id.as_str()) else {
            continue;
        };
        let entry = totals
            .entry(assignment.category_label().to_string())
            .or_default();
        entry.earned += g.score;
        entry.max += assignment.max_points;
    }

    totals
}

/// Category-weighted percentage average for one student within one class.
///
/// Per weighted category with at least one graded assignment, the category
/// percent contributes `weight/100` of itself to the total; the sum is then
/// renormalized by the weight actually used, so a student graded only in a
/// 20%-weighted category is not capped at 20%. Categories with no graded
/// assignments consume none of the denominator.
///
/// Returns `None` when no weighted category has any graded assignment — the
/// "no data" sentinel, distinct from a legitimate 0.0 average.
pub fn weighted_average(
    student_id: &str,
    assignments: &[Assignment],
    grades: &[GradeRecord],
    weights: &CategoryWeights,
) -> Option<f64> {
    let totals = accumulate(student_id, assignments, grades, weights);

    let mut weighted_sum = 0.0_f64;
    let mut weight_used = 0.0_f64;
    for (category, weight) in weights.iter() {
        let Some(t) = totals.get(category) else {
            continue;
        };
        if t.max <= 0.0 {
            continue;
        }
        let percent = 100.0 * t.earned / t.max;
        weighted_sum += percent * (weight / 100.0);
        weight_used += weight / 100.0;
    }

    if weight_used > 0.0 {
        Some(weighted_sum / weight_used)
    } else {
        None
    }
}

/// Per-category earned/max/percent rows for one student, sorted by category
/// name. Declared-but-ungraded categories appear with `percent: None`;
/// graded-but-undeclared categories appear with `weight: None`.
pub fn category_breakdown(
    student_id: &str,
    assignments: &[Assignment],
    grades: &[GradeRecord],
    weights: &CategoryWeights,
) -> Vec<CategoryBreakdown> {
    let totals = accumulate(student_id, assignments, grades, weights);

    let mut rows: Vec<CategoryBreakdown> = totals
        .into_iter()
        .map(|(category, t)| {
            let percent = if t.max > 0.0 {
                Some(100.0 * t.earned / t.max)
            } else {
                None
            };
            CategoryBreakdown {
                weight: weights.get(&category),
                category,
                earned: t.earned,
                max: t.max,
                percent,
            }
        })
        .collect();
    rows.sort_by(|a, b| a.category.cmp(&b.category));
    rows
}
