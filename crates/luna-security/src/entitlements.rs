//! Subscription feature gating.
//!
//! Limits are a pure function of the plan: they are derived on every check
//! and never persisted, so a plan change takes effect immediately.

use luna_common::{Error, Plan};
use serde::Serialize;

/// Limits and switches granted by a subscription plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanFeatures {
    pub max_companions: u32,
    pub voice_minutes_per_month: u32,
    pub advanced_personality: bool,
    pub exclusive_avatars: bool,
    /// Maximum stored memories per companion.
    pub memory_capacity: u32,
    pub custom_scenarios: bool,
}

impl PlanFeatures {
    pub const fn for_plan(plan: Plan) -> Self {
        match plan {
            Plan::Free => Self {
                max_companions: 1,
                voice_minutes_per_month: 0,
                advanced_personality: false,
                exclusive_avatars: false,
                memory_capacity: 100,
                custom_scenarios: false,
            },
            Plan::Premium => Self {
                max_companions: 3,
                voice_minutes_per_month: 60,
                advanced_personality: true,
                exclusive_avatars: false,
                memory_capacity: 1_000,
                custom_scenarios: true,
            },
            Plan::Ultimate => Self {
                max_companions: 10,
                voice_minutes_per_month: 300,
                advanced_personality: true,
                exclusive_avatars: true,
                memory_capacity: 10_000,
                custom_scenarios: true,
            },
        }
    }
}

/// An entitlement-gated operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateCompanion,
    UseAdvancedPersonality,
    UseExclusiveAvatar,
    /// Generate `minutes` of voice on top of the month's usage.
    UseVoice { minutes: u32 },
    StoreMemory,
    UseScenario,
}

/// Current resource consumption relevant to an [`Action`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub companions: u32,
    pub voice_minutes_used: u32,
    /// Memories held by the companion the action targets.
    pub memories: u32,
}

/// Why an action was refused, phrased for the end user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub plan: Plan,
    pub message: String,
    /// Cheapest plan that would permit the action, if any does.
    pub upgrade_to: Option<Plan>,
}

impl From<Denial> for Error {
    fn from(denial: Denial) -> Self {
        Error::Forbidden(denial.message)
    }
}

pub fn check(plan: Plan, action: Action, usage: &Usage) -> Result<(), Denial> {
    if permits(plan, action, usage) {
        return Ok(());
    }

    let upgrade_to = Plan::ALL
        .into_iter()
        .filter(|p| *p > plan)
        .find(|p| permits(*p, action, usage));

    Err(Denial {
        plan,
        message: denial_message(plan, action, usage, upgrade_to),
        upgrade_to,
    })
}

fn permits(plan: Plan, action: Action, usage: &Usage) -> bool {
    let features = PlanFeatures::for_plan(plan);
    match action {
        Action::CreateCompanion => usage.companions < features.max_companions,
        Action::UseAdvancedPersonality => features.advanced_personality,
        Action::UseExclusiveAvatar => features.exclusive_avatars,
        Action::UseVoice { minutes } => {
            usage.voice_minutes_used.saturating_add(minutes) <= features.voice_minutes_per_month
                && features.voice_minutes_per_month > 0
        }
        Action::StoreMemory => usage.memories < features.memory_capacity,
        Action::UseScenario => features.custom_scenarios,
    }
}

fn denial_message(plan: Plan, action: Action, usage: &Usage, upgrade_to: Option<Plan>) -> String {
    let features = PlanFeatures::for_plan(plan);
    let reason = match action {
        Action::CreateCompanion => format!(
            "Your {plan} plan allows {} companion{}, and you already have {}.",
            features.max_companions,
            if features.max_companions == 1 { "" } else { "s" },
            usage.companions
        ),
        Action::UseAdvancedPersonality => {
            format!("Advanced personality settings are not included in the {plan} plan.")
        }
        Action::UseExclusiveAvatar => {
            format!("Exclusive avatars are not included in the {plan} plan.")
        }
        Action::UseVoice { .. } if features.voice_minutes_per_month == 0 => {
            format!("Voice messages are not included in the {plan} plan.")
        }
        Action::UseVoice { minutes } => format!(
            "This request needs {minutes} voice minute{} but only {} of your {} monthly minutes remain.",
            if minutes == 1 { "" } else { "s" },
            features
                .voice_minutes_per_month
                .saturating_sub(usage.voice_minutes_used),
            features.voice_minutes_per_month
        ),
        Action::StoreMemory => format!(
            "This companion has reached the {plan} plan memory capacity of {}.",
            features.memory_capacity
        ),
        Action::UseScenario => format!("Custom scenarios are not included in the {plan} plan."),
    };

    match upgrade_to {
        Some(next) => format!("{reason} Upgrade to {next} to unlock more."),
        None => reason,
    }
}

#[cfg(test)]
mod tests {
    use super::{Action, PlanFeatures, Usage, check};
    use luna_common::Plan;

    #[test]
    fn max_companions_matches_plan_table() {
        assert_eq!(PlanFeatures::for_plan(Plan::Free).max_companions, 1);
        assert_eq!(PlanFeatures::for_plan(Plan::Premium).max_companions, 3);
        assert_eq!(PlanFeatures::for_plan(Plan::Ultimate).max_companions, 10);
    }

    #[test]
    fn companion_creation_is_denied_at_the_limit() {
        for plan in Plan::ALL {
            let limit = PlanFeatures::for_plan(plan).max_companions;
            let below = Usage {
                companions: limit - 1,
                ..Usage::default()
            };
            let at = Usage {
                companions: limit,
                ..Usage::default()
            };
            assert!(check(plan, Action::CreateCompanion, &below).is_ok());
            assert!(check(plan, Action::CreateCompanion, &at).is_err());
        }
    }

    #[test]
    fn denial_suggests_cheapest_sufficient_upgrade() {
        let usage = Usage {
            companions: 1,
            ..Usage::default()
        };
        let denial = check(Plan::Free, Action::CreateCompanion, &usage).unwrap_err();
        assert_eq!(denial.upgrade_to, Some(Plan::Premium));
        assert!(denial.message.contains("free plan allows 1 companion,"));

        let denial = check(Plan::Premium, Action::UseExclusiveAvatar, &usage).unwrap_err();
        assert_eq!(denial.upgrade_to, Some(Plan::Ultimate));

        let maxed = Usage {
            companions: 10,
            ..Usage::default()
        };
        let denial = check(Plan::Ultimate, Action::CreateCompanion, &maxed).unwrap_err();
        assert_eq!(denial.upgrade_to, None);
        assert!(!denial.message.contains("Upgrade"));
    }

    #[test]
    fn voice_is_metered_against_monthly_minutes() {
        let usage = Usage {
            voice_minutes_used: 58,
            ..Usage::default()
        };
        assert!(check(Plan::Premium, Action::UseVoice { minutes: 2 }, &usage).is_ok());
        let denial = check(Plan::Premium, Action::UseVoice { minutes: 3 }, &usage).unwrap_err();
        assert!(denial.message.contains("only 2 of your 60"));
        assert_eq!(denial.upgrade_to, Some(Plan::Ultimate));

        let denial =
            check(Plan::Free, Action::UseVoice { minutes: 1 }, &Usage::default()).unwrap_err();
        assert!(denial.message.contains("not included in the free plan"));
    }

    #[test]
    fn feature_switches_follow_plan() {
        let usage = Usage::default();
        assert!(check(Plan::Free, Action::UseAdvancedPersonality, &usage).is_err());
        assert!(check(Plan::Premium, Action::UseAdvancedPersonality, &usage).is_ok());
        assert!(check(Plan::Free, Action::UseScenario, &usage).is_err());
        assert!(check(Plan::Premium, Action::UseScenario, &usage).is_ok());
        assert!(check(Plan::Ultimate, Action::UseExclusiveAvatar, &usage).is_ok());
    }

    #[test]
    fn memory_capacity_is_enforced_per_companion() {
        let full = Usage {
            memories: 100,
            ..Usage::default()
        };
        assert!(check(Plan::Free, Action::StoreMemory, &full).is_err());
        assert!(check(Plan::Premium, Action::StoreMemory, &full).is_ok());
    }
}
