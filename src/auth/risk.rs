//! Contextual risk scoring

use crate::auth::models::{AuthContext, UserPrincipal};
use chrono::{Local, NaiveTime, Timelike};

const OFF_HOURS_WEIGHT: f64 = 0.2;
const IP_WEIGHT: f64 = 0.1;
const DEVICE_WEIGHT: f64 = 0.1;
const MFA_CREDIT: f64 = 0.3;

/// True before 06:00 or after 22:00, at second resolution
pub fn is_off_hours(time: NaiveTime) -> bool {
    let hms = (time.hour(), time.minute(), time.second());
    hms < (6, 0, 0) || hms > (22, 0, 0)
}

/// Score a principal at a given local time of day. Always within `[0, 1]`.
pub fn assess_risk_at(
    principal: &UserPrincipal,
    context: Option<&AuthContext>,
    local_time: NaiveTime,
) -> f64 {
    let mut score = 0.0;

    if is_off_hours(local_time) {
        score += OFF_HOURS_WEIGHT;
    }
    if let Some(ctx) = context {
        if ctx.ip_address.is_some() {
            score += IP_WEIGHT;
        }
        if ctx.device_id.is_some() {
            score += DEVICE_WEIGHT;
        }
    }
    if principal.mfa_authenticated {
        score -= MFA_CREDIT;
    }

    f64::clamp(score, 0.0, 1.0)
}

/// Score a principal at the current local time
pub fn assess_risk(principal: &UserPrincipal, context: Option<&AuthContext>) -> f64 {
    assess_risk_at(principal, context, Local::now().time())
}
