// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Speaker selection.
//!
//! Both functions here are pure: the first speaker depends only on the
//! request and the policy, and each later step only on the last speaker and
//! the termination flags.

use crate::agents::AgentRole;
use crate::config::ResolvedRouting;

use super::types::{Next, RequestTag, TaskRequest, Termination, TerminationFlags};

/// Keyword policy for requests that carry no tag.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingPolicy {
    direct_keywords: Vec<String>,
    plan_keywords: Vec<String>,
}

impl RoutingPolicy {
    pub fn new(direct_keywords: Vec<String>, plan_keywords: Vec<String>) -> Self {
        let lower = |words: Vec<String>| -> Vec<String> {
            words
                .into_iter()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect()
        };
        Self {
            direct_keywords: lower(direct_keywords),
            plan_keywords: lower(plan_keywords),
        }
    }

    /// Choose who speaks first.
    ///
    /// Tags win over keywords, and planning tags win over direct ones. An
    /// untagged request goes to the Planner if it mentions a plan keyword,
    /// to the Coder if it mentions a direct keyword, and to the Planner
    /// otherwise.
    pub fn initial_speaker(&self, request: &TaskRequest) -> AgentRole {
        if request.tags.iter().any(|t| t.speaker() == AgentRole::Planner) {
            return AgentRole::Planner;
        }
        if request.tags.iter().any(|t| matches!(t, RequestTag::Simple | RequestTag::Direct)) {
            return AgentRole::Coder;
        }

        let text = request.message.to_lowercase();
        if self.plan_keywords.iter().any(|w| text.contains(w.as_str())) {
            AgentRole::Planner
        } else if self.direct_keywords.iter().any(|w| text.contains(w.as_str())) {
            AgentRole::Coder
        } else {
            AgentRole::Planner
        }
    }
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self::from(&ResolvedRouting::default())
    }
}

impl From<&ResolvedRouting> for RoutingPolicy {
    fn from(routing: &ResolvedRouting) -> Self {
        Self::new(routing.direct_keywords.clone(), routing.plan_keywords.clone())
    }
}

/// One FSM step.
///
/// `last` is `None` before the first turn. A fatal error stops first, then
/// a completion marker from the Coder, then the round limit. The Planner
/// always hands over to the Coder, and the Coder keeps the floor.
pub fn next_speaker(initial: AgentRole, last: Option<AgentRole>, flags: TerminationFlags) -> Next {
    if flags.fatal_error {
        return Next::Stop(Termination::Failed);
    }
    if flags.completion_marker && last == Some(AgentRole::Coder) {
        return Next::Stop(Termination::Completed);
    }
    if flags.round_limit_reached {
        return Next::Stop(Termination::RoundLimit);
    }

    match last {
        None => Next::Speak(initial),
        Some(AgentRole::Planner) | Some(AgentRole::Coder) => Next::Speak(AgentRole::Coder),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(completion_marker: bool, round_limit_reached: bool, fatal_error: bool) -> TerminationFlags {
        TerminationFlags {
            completion_marker,
            round_limit_reached,
            fatal_error,
        }
    }

    #[test]
    fn test_tags_win_over_keywords() {
        let policy = RoutingPolicy::default();
        let request = TaskRequest::new("design and build a settings page").with_tag(RequestTag::Simple);
        assert_eq!(policy.initial_speaker(&request), AgentRole::Coder);

        let request = TaskRequest::new("fix the typo").with_tag(RequestTag::Complex);
        assert_eq!(policy.initial_speaker(&request), AgentRole::Planner);
    }

    #[test]
    fn test_planning_tag_wins_over_direct_tag() {
        let policy = RoutingPolicy::default();
        let request = TaskRequest::new("x")
            .with_tag(RequestTag::Direct)
            .with_tag(RequestTag::Plan);
        assert_eq!(policy.initial_speaker(&request), AgentRole::Planner);
    }

    #[test]
    fn test_keyword_routing() {
        let policy = RoutingPolicy::default();
        assert_eq!(
            policy.initial_speaker(&TaskRequest::new("Add a console log to the entry file")),
            AgentRole::Coder
        );
        assert_eq!(
            policy.initial_speaker(&TaskRequest::new("Design and build a settings page")),
            AgentRole::Planner
        );
        assert_eq!(
            policy.initial_speaker(&TaskRequest::new("what does this project do?")),
            AgentRole::Planner
        );
    }

    #[test]
    fn test_routing_is_deterministic() {
        let policy = RoutingPolicy::new(vec!["Hotfix".to_string()], vec![]);
        let request = TaskRequest::new("HOTFIX the header");
        let first = policy.initial_speaker(&request);
        for _ in 0..10 {
            assert_eq!(policy.initial_speaker(&request), first);
        }
        assert_eq!(first, AgentRole::Coder);
    }

    #[test]
    fn test_fsm_transitions() {
        let none = TerminationFlags::default();
        assert_eq!(next_speaker(AgentRole::Planner, None, none), Next::Speak(AgentRole::Planner));
        assert_eq!(next_speaker(AgentRole::Coder, None, none), Next::Speak(AgentRole::Coder));
        assert_eq!(
            next_speaker(AgentRole::Planner, Some(AgentRole::Planner), none),
            Next::Speak(AgentRole::Coder)
        );
        assert_eq!(
            next_speaker(AgentRole::Planner, Some(AgentRole::Coder), none),
            Next::Speak(AgentRole::Coder)
        );
    }

    #[test]
    fn test_fsm_termination_precedence() {
        let coder = Some(AgentRole::Coder);
        assert_eq!(
            next_speaker(AgentRole::Coder, coder, flags(true, true, true)),
            Next::Stop(Termination::Failed)
        );
        assert_eq!(
            next_speaker(AgentRole::Coder, coder, flags(true, true, false)),
            Next::Stop(Termination::Completed)
        );
        assert_eq!(
            next_speaker(AgentRole::Coder, coder, flags(false, true, false)),
            Next::Stop(Termination::RoundLimit)
        );
    }

    #[test]
    fn test_planner_marker_does_not_complete() {
        assert_eq!(
            next_speaker(AgentRole::Planner, Some(AgentRole::Planner), flags(true, false, false)),
            Next::Speak(AgentRole::Coder)
        );
    }
}
