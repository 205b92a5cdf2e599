//! Precondition guards evaluated against an actor's condition flags before a
//! packet handler runs.
//!
//! Evaluation is a pure function of the flag bitset and the handler's
//! declared rules; the only side effects are the explicitly modeled
//! corrective actions performed by the dispatcher on a block.

/// Live condition-flag bitset for an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConditionFlags(u32);

impl ConditionFlags {
    pub const NONE: ConditionFlags = ConditionFlags(0);
    pub const FROZEN: ConditionFlags = ConditionFlags(1 << 0);
    pub const ASLEEP: ConditionFlags = ConditionFlags(1 << 1);
    pub const PARALYZED: ConditionFlags = ConditionFlags(1 << 2);
    pub const IN_DIALOG: ConditionFlags = ConditionFlags(1 << 3);
    pub const IN_EXCHANGE: ConditionFlags = ConditionFlags(1 << 4);
    pub const CASTING: ConditionFlags = ConditionFlags(1 << 5);
    pub const ALIVE: ConditionFlags = ConditionFlags(1 << 6);
    pub const IN_COMA: ConditionFlags = ConditionFlags(1 << 7);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn union(self, other: ConditionFlags) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn without(self, other: ConditionFlags) -> Self {
        Self(self.0 & !other.0)
    }

    /// Any flag in `set` present?
    pub const fn intersects(self, set: ConditionFlags) -> bool {
        self.0 & set.0 != 0
    }

    /// All flags in `set` present?
    pub const fn contains(self, set: ConditionFlags) -> bool {
        self.0 & set.0 == set.0
    }
}

impl std::ops::BitOr for ConditionFlags {
    type Output = ConditionFlags;
    fn bitor(self, rhs: ConditionFlags) -> ConditionFlags {
        self.union(rhs)
    }
}

/// What the dispatcher does instead of running a blocked handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectiveAction {
    /// Send the given system notice to the actor.
    SystemMessage(&'static str),
    /// Force a client resync instead of messaging.
    ForceRefresh,
}

pub const MSG_CANNOT_IN_STATE: &str = "It cannot be done in your current state.";
pub const MSG_CANNOT_NOW: &str = "You cannot do that now.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Block(CorrectiveAction),
}

#[derive(Debug, Clone, Copy)]
enum GuardRule {
    /// Block if the actor has any condition in the set.
    Prohibited(ConditionFlags, CorrectiveAction),
    /// Block unless the actor has every condition in the set.
    Required(ConditionFlags),
}

/// The rule set statically declared alongside a handler at registry build
/// time. No runtime introspection; what you register is what runs.
#[derive(Debug, Clone, Default)]
pub struct GuardRules {
    rules: Vec<GuardRule>,
}

impl GuardRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prohibited(mut self, set: ConditionFlags) -> Self {
        self.rules.push(GuardRule::Prohibited(
            set,
            CorrectiveAction::SystemMessage(MSG_CANNOT_IN_STATE),
        ));
        self
    }

    /// Prohibited rule with a non-default corrective action.
    pub fn prohibited_with(mut self, set: ConditionFlags, action: CorrectiveAction) -> Self {
        self.rules.push(GuardRule::Prohibited(set, action));
        self
    }

    pub fn required(mut self, set: ConditionFlags) -> Self {
        self.rules.push(GuardRule::Required(set));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluate against the actor's current flags. A handler with no rules
    /// always allows. When both a prohibition and a requirement would block,
    /// the prohibition's corrective action wins.
    pub fn evaluate(&self, flags: ConditionFlags) -> GuardDecision {
        let mut required_block = None;
        for rule in &self.rules {
            match *rule {
                GuardRule::Prohibited(set, action) => {
                    if flags.intersects(set) {
                        return GuardDecision::Block(action);
                    }
                }
                GuardRule::Required(set) => {
                    if !flags.contains(set) && required_block.is_none() {
                        required_block =
                            Some(CorrectiveAction::SystemMessage(MSG_CANNOT_NOW));
                    }
                }
            }
        }
        match required_block {
            Some(action) => GuardDecision::Block(action),
            None => GuardDecision::Allow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_ops() {
        let flags = ConditionFlags::FROZEN | ConditionFlags::IN_DIALOG;
        assert!(flags.intersects(ConditionFlags::FROZEN));
        assert!(flags.intersects(ConditionFlags::IN_DIALOG | ConditionFlags::ASLEEP));
        assert!(!flags.intersects(ConditionFlags::ASLEEP));
        assert!(flags.contains(ConditionFlags::FROZEN));
        assert!(!flags.contains(ConditionFlags::FROZEN | ConditionFlags::ASLEEP));
        assert_eq!(
            flags.without(ConditionFlags::FROZEN),
            ConditionFlags::IN_DIALOG
        );
    }

    #[test]
    fn test_no_rules_allows() {
        let rules = GuardRules::new();
        assert_eq!(
            rules.evaluate(ConditionFlags::FROZEN | ConditionFlags::ASLEEP),
            GuardDecision::Allow
        );
    }

    #[test]
    fn test_prohibited_blocks_on_any_match() {
        let rules = GuardRules::new().prohibited(ConditionFlags::FROZEN | ConditionFlags::ASLEEP);
        assert_eq!(rules.evaluate(ConditionFlags::NONE), GuardDecision::Allow);
        assert_eq!(
            rules.evaluate(ConditionFlags::ASLEEP),
            GuardDecision::Block(CorrectiveAction::SystemMessage(MSG_CANNOT_IN_STATE))
        );
    }

    #[test]
    fn test_required_blocks_on_missing() {
        let rules = GuardRules::new().required(ConditionFlags::ALIVE);
        assert_eq!(
            rules.evaluate(ConditionFlags::NONE),
            GuardDecision::Block(CorrectiveAction::SystemMessage(MSG_CANNOT_NOW))
        );
        assert_eq!(rules.evaluate(ConditionFlags::ALIVE), GuardDecision::Allow);
    }

    #[test]
    fn test_required_needs_full_set() {
        let rules = GuardRules::new().required(ConditionFlags::ALIVE | ConditionFlags::CASTING);
        assert_eq!(
            rules.evaluate(ConditionFlags::ALIVE),
            GuardDecision::Block(CorrectiveAction::SystemMessage(MSG_CANNOT_NOW))
        );
        assert_eq!(
            rules.evaluate(ConditionFlags::ALIVE | ConditionFlags::CASTING),
            GuardDecision::Allow
        );
    }

    #[test]
    fn test_prohibited_takes_precedence() {
        let rules = GuardRules::new()
            .required(ConditionFlags::ALIVE)
            .prohibited_with(ConditionFlags::IN_DIALOG, CorrectiveAction::ForceRefresh);
        // Both rules would block: actor is in dialog and not alive.
        // Prohibition wins.
        assert_eq!(
            rules.evaluate(ConditionFlags::IN_DIALOG),
            GuardDecision::Block(CorrectiveAction::ForceRefresh)
        );
    }

    #[test]
    fn test_custom_corrective_action() {
        let rules = GuardRules::new()
            .prohibited_with(ConditionFlags::IN_DIALOG, CorrectiveAction::ForceRefresh);
        assert_eq!(
            rules.evaluate(ConditionFlags::IN_DIALOG),
            GuardDecision::Block(CorrectiveAction::ForceRefresh)
        );
    }
}
