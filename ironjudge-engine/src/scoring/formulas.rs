//! Bodyweight-normalized scoring formulas
//!
//! Every function is pure and returns 0.0 for a non-positive total or
//! bodyweight: an athlete who bombed out has no score, which is a legitimate
//! state and not an error. Bodyweights outside a formula's fitted range are
//! clamped to the range ends.

use ironjudge_common::events::{Equipment, Sex};

/// Which lifts a powerlifting total covers (selects IPF / GL coefficients)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LiftEvent {
    /// Squat + bench + deadlift
    #[default]
    FullPower,
    BenchOnly,
}

fn has_no_total(total: f64, bodyweight: f64) -> bool {
    !(total > 0.0) || !(bodyweight > 0.0)
}

fn polynomial(coefficients: &[f64], x: f64) -> f64 {
    // Horner, highest degree last in the slice
    coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

// ========================================
// Wilks (2010 coefficients)
// ========================================

const WILKS_MALE: [f64; 6] = [
    -216.0475144,
    16.2606339,
    -0.002388645,
    -0.00113732,
    7.01863e-06,
    -1.291e-08,
];
const WILKS_FEMALE: [f64; 6] = [
    594.31747775582,
    -27.23842536447,
    0.82112226871,
    -0.00930733913,
    4.731582e-05,
    -9.054e-08,
];

pub fn wilks_coefficient(bodyweight: f64, sex: Sex) -> f64 {
    let (coefficients, lo, hi) = match sex {
        Sex::Male => (&WILKS_MALE, 40.0, 201.9),
        Sex::Female => (&WILKS_FEMALE, 26.51, 154.53),
    };
    500.0 / polynomial(coefficients, bodyweight.clamp(lo, hi))
}

pub fn calculate_wilks(total: f64, bodyweight: f64, sex: Sex) -> f64 {
    if has_no_total(total, bodyweight) {
        return 0.0;
    }
    total * wilks_coefficient(bodyweight, sex)
}

// ========================================
// DOTS
// ========================================

const DOTS_MALE: [f64; 5] = [
    -307.75076,
    24.0900756,
    -0.1918759221,
    0.0007391293,
    -0.000001093,
];
const DOTS_FEMALE: [f64; 5] = [
    -57.96288,
    13.6175032,
    -0.1126655495,
    0.0005158568,
    -0.0000010706,
];

pub fn dots_coefficient(bodyweight: f64, sex: Sex) -> f64 {
    let (coefficients, lo, hi) = match sex {
        Sex::Male => (&DOTS_MALE, 40.0, 210.0),
        Sex::Female => (&DOTS_FEMALE, 40.0, 150.0),
    };
    500.0 / polynomial(coefficients, bodyweight.clamp(lo, hi))
}

pub fn calculate_dots(total: f64, bodyweight: f64, sex: Sex) -> f64 {
    if has_no_total(total, bodyweight) {
        return 0.0;
    }
    total * dots_coefficient(bodyweight, sex)
}

// ========================================
// IPF points (2019) and IPF GL points (2020)
// ========================================

/// (c1, c2, c3, c4): mean = c1·ln(bw) − c2, deviation = c3·ln(bw) − c4
fn ipf_parameters(sex: Sex, equipment: Equipment, event: LiftEvent) -> [f64; 4] {
    match (sex, equipment, event) {
        (Sex::Male, Equipment::Raw, LiftEvent::FullPower) => [310.67, 857.785, 53.216, 147.0835],
        (Sex::Male, Equipment::Equipped, LiftEvent::FullPower) => [387.265, 1121.28, 80.6324, 222.4896],
        (Sex::Male, Equipment::Raw, LiftEvent::BenchOnly) => [86.4745, 259.155, 17.5785, 53.122],
        (Sex::Male, Equipment::Equipped, LiftEvent::BenchOnly) => [133.94, 441.465, 35.3938, 113.0057],
        (Sex::Female, Equipment::Raw, LiftEvent::FullPower) => [125.1435, 228.03, 34.5246, 86.8301],
        (Sex::Female, Equipment::Equipped, LiftEvent::FullPower) => [176.58, 373.315, 48.4534, 110.0103],
        (Sex::Female, Equipment::Raw, LiftEvent::BenchOnly) => [25.0485, 43.848, 6.7172, 13.952],
        (Sex::Female, Equipment::Equipped, LiftEvent::BenchOnly) => [49.106, 124.209, 23.199, 67.4926],
    }
}

/// IPF points, floored at 0 (the raw formula goes negative for small totals)
pub fn calculate_ipf(
    total: f64,
    bodyweight: f64,
    sex: Sex,
    equipment: Equipment,
    event: LiftEvent,
) -> f64 {
    if has_no_total(total, bodyweight) {
        return 0.0;
    }
    let [c1, c2, c3, c4] = ipf_parameters(sex, equipment, event);
    let ln_bw = bodyweight.max(40.0).ln();
    let mean = c1 * ln_bw - c2;
    let deviation = c3 * ln_bw - c4;
    if deviation <= 0.0 {
        return 0.0;
    }
    (500.0 + 100.0 * (total - mean) / deviation).max(0.0)
}

/// (A, B, C): GL = total · 100 / (A − B·e^(−C·bw))
fn gl_parameters(sex: Sex, equipment: Equipment, event: LiftEvent) -> [f64; 3] {
    match (sex, equipment, event) {
        (Sex::Male, Equipment::Raw, LiftEvent::FullPower) => [1199.72839, 1025.18162, 0.00921],
        (Sex::Male, Equipment::Equipped, LiftEvent::FullPower) => [1236.25115, 1449.21864, 0.01644],
        (Sex::Male, Equipment::Raw, LiftEvent::BenchOnly) => [320.98041, 281.40258, 0.01008],
        (Sex::Male, Equipment::Equipped, LiftEvent::BenchOnly) => [381.22073, 733.79378, 0.02398],
        (Sex::Female, Equipment::Raw, LiftEvent::FullPower) => [610.32796, 1045.59282, 0.03048],
        (Sex::Female, Equipment::Equipped, LiftEvent::FullPower) => [758.63878, 949.31382, 0.02435],
        (Sex::Female, Equipment::Raw, LiftEvent::BenchOnly) => [142.40398, 442.52671, 0.04724],
        (Sex::Female, Equipment::Equipped, LiftEvent::BenchOnly) => [221.82209, 357.00377, 0.02937],
    }
}

pub fn calculate_gl(
    total: f64,
    bodyweight: f64,
    sex: Sex,
    equipment: Equipment,
    event: LiftEvent,
) -> f64 {
    if has_no_total(total, bodyweight) {
        return 0.0;
    }
    let [a, b, c] = gl_parameters(sex, equipment, event);
    let denominator = a - b * (-c * bodyweight.max(35.0)).exp();
    if denominator <= 0.0 {
        return 0.0;
    }
    (total * 100.0 / denominator).max(0.0)
}

// ========================================
// Sinclair (2021-2024 cycle) and SMF
// ========================================

const SINCLAIR_MALE: (f64, f64) = (0.722762521, 193.609);
const SINCLAIR_FEMALE: (f64, f64) = (0.787004341, 153.757);

/// Sinclair coefficient; exactly 1.0 at or above the reference bodyweight
pub fn sinclair_coefficient(bodyweight: f64, sex: Sex) -> f64 {
    let (a, reference) = match sex {
        Sex::Male => SINCLAIR_MALE,
        Sex::Female => SINCLAIR_FEMALE,
    };
    if !(bodyweight > 0.0) || bodyweight >= reference {
        return 1.0;
    }
    let x = (bodyweight / reference).log10();
    10f64.powf(a * x * x)
}

pub fn calculate_sinclair(total: f64, bodyweight: f64, sex: Sex) -> f64 {
    if has_no_total(total, bodyweight) {
        return 0.0;
    }
    total * sinclair_coefficient(bodyweight, sex)
}

/// Meltzer-Faber masters coefficients from age 30 upward
const MELTZER_FABER_MALE: [f64; 61] = [
    1.000, 1.016, 1.031, 1.046, 1.059, 1.072, 1.083, 1.096, 1.109, 1.122, // 30-39
    1.135, 1.149, 1.162, 1.176, 1.189, 1.203, 1.218, 1.233, 1.248, 1.263, // 40-49
    1.279, 1.297, 1.316, 1.338, 1.361, 1.385, 1.411, 1.437, 1.462, 1.488, // 50-59
    1.514, 1.541, 1.568, 1.598, 1.629, 1.663, 1.699, 1.738, 1.779, 1.823, // 60-69
    1.867, 1.910, 1.953, 2.004, 2.060, 2.117, 2.181, 2.255, 2.336, 2.419, // 70-79
    2.504, 2.597, 2.702, 2.831, 2.981, 3.153, 3.352, 3.580, 3.843, 4.145, // 80-89
    4.493, // 90
];
const MELTZER_FABER_FEMALE: [f64; 51] = [
    1.000, 1.016, 1.017, 1.037, 1.046, 1.059, 1.075, 1.091, 1.108, 1.125, // 30-39
    1.142, 1.160, 1.179, 1.198, 1.219, 1.239, 1.260, 1.282, 1.305, 1.329, // 40-49
    1.354, 1.380, 1.405, 1.430, 1.457, 1.485, 1.513, 1.541, 1.569, 1.597, // 50-59
    1.627, 1.658, 1.690, 1.722, 1.755, 1.788, 1.822, 1.857, 1.893, 1.929, // 60-69
    1.966, 2.004, 2.043, 2.083, 2.124, 2.166, 2.209, 2.253, 2.298, 2.344, // 70-79
    2.391, // 80
];

/// Masters age coefficient: 1.0 below 30 or when age is unknown, last table
/// value beyond the table's end
pub fn smf_age_coefficient(age: Option<u32>, sex: Sex) -> f64 {
    let Some(age) = age else {
        return 1.0;
    };
    if age < 30 {
        return 1.0;
    }
    let table: &[f64] = match sex {
        Sex::Male => &MELTZER_FABER_MALE,
        Sex::Female => &MELTZER_FABER_FEMALE,
    };
    let idx = ((age - 30) as usize).min(table.len() - 1);
    table[idx]
}

pub fn calculate_smf(total: f64, bodyweight: f64, sex: Sex, age: Option<u32>) -> f64 {
    calculate_sinclair(total, bodyweight, sex) * smf_age_coefficient(age, sex)
}
