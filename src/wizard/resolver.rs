//! Decides whether a requested step is reachable.

use crate::error::{ResolutionError, UnreachableReason};

use super::model::{Candidates, StepDescriptor, WizardContext};
use super::step::{self, WizardStep};

/// Resolve `requested_step` for the given context.
///
/// Checks run in a fixed order: step name, account reachability, OAuth
/// reachability, event-type availability, team membership. Pure; the
/// caller supplies everything it needs.
pub fn resolve(
    requested_step: &str,
    context: &WizardContext,
    candidates: &Candidates,
    app_name: &str,
) -> Result<StepDescriptor, ResolutionError> {
    let step: WizardStep = requested_step.parse()?;

    let unreachable = |reason| ResolutionError::StepUnreachable {
        step,
        reason,
        app_slug: context.app_slug.clone(),
        entry: step::entry_step(context.has_teams, context.is_oauth_app),
    };

    if step == WizardStep::Accounts && !context.has_teams {
        return Err(unreachable(UnreachableReason::NoTeams));
    }

    if step == WizardStep::Connect && !context.is_oauth_app {
        return Err(unreachable(UnreachableReason::NotOAuth));
    }

    if step == WizardStep::EventTypes && candidates.event_types.is_empty() {
        return Err(ResolutionError::NoEventTypes {
            app_slug: context.app_slug.clone(),
        });
    }

    if let Some(team_id) = context.team_id {
        if !candidates.team_ids.contains(&team_id) {
            return Err(ResolutionError::ForbiddenTeam { team_id });
        }
    }

    let text = step::describe(step, app_name);
    Ok(StepDescriptor {
        step,
        title: text.title,
        description: text.description,
        ordinal: step::ordinal(step, context.has_teams, context.is_oauth_app),
        total_steps: step::total_steps(context.has_teams, context.is_oauth_app),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wizard::model::EventTypeOption;

    fn ctx(has_teams: bool, is_oauth_app: bool) -> WizardContext {
        WizardContext {
            has_teams,
            is_oauth_app,
            team_id: None,
            user_id: 1,
            app_slug: "zoom".into(),
        }
    }

    fn event_type(id: i64, position: i64) -> EventTypeOption {
        EventTypeOption {
            id,
            title: format!("Meeting {id}"),
            slug: format!("meeting-{id}"),
            length_minutes: 30,
            position,
            team_id: None,
        }
    }

    fn with_event_types() -> Candidates {
        Candidates {
            team_ids: vec![10],
            event_types: vec![event_type(1, 5), event_type(2, 0)],
        }
    }

    #[test]
    fn unknown_step_rejected_first() {
        let err = resolve("billing", &ctx(false, false), &Candidates::default(), "Zoom")
            .unwrap_err();
        assert_eq!(
            err,
            ResolutionError::UnknownStep {
                step: "billing".into()
            }
        );
    }

    #[test]
    fn accounts_without_teams_is_unreachable() {
        for is_oauth in [false, true] {
            let err = resolve("accounts", &ctx(false, is_oauth), &with_event_types(), "Zoom")
                .unwrap_err();
            match err {
                ResolutionError::StepUnreachable {
                    step,
                    reason,
                    app_slug,
                    entry,
                } => {
                    assert_eq!(step, WizardStep::Accounts);
                    assert_eq!(reason, UnreachableReason::NoTeams);
                    assert_eq!(app_slug, "zoom");
                    let expected = if is_oauth {
                        WizardStep::Connect
                    } else {
                        WizardStep::EventTypes
                    };
                    assert_eq!(entry, expected);
                }
                other => panic!("expected StepUnreachable, got {other:?}"),
            }
        }
    }

    #[test]
    fn connect_without_oauth_is_unreachable() {
        for has_teams in [false, true] {
            let err = resolve("connect", &ctx(has_teams, false), &with_event_types(), "Zoom")
                .unwrap_err();
            assert!(matches!(
                err,
                ResolutionError::StepUnreachable {
                    reason: UnreachableReason::NotOAuth,
                    ..
                }
            ));
        }
    }

    #[test]
    fn event_types_requires_candidates() {
        let err = resolve("event-types", &ctx(true, true), &Candidates::default(), "Zoom")
            .unwrap_err();
        assert_eq!(
            err,
            ResolutionError::NoEventTypes {
                app_slug: "zoom".into()
            }
        );
    }

    #[test]
    fn event_types_ordinal_depends_on_flags() {
        let cases = [
            ((true, true), 2),
            ((true, false), 1),
            ((false, true), 1),
            ((false, false), 0),
        ];
        for ((has_teams, is_oauth), expected) in cases {
            let desc = resolve(
                "event-types",
                &ctx(has_teams, is_oauth),
                &with_event_types(),
                "Zoom",
            )
            .unwrap();
            assert_eq!(desc.ordinal, expected);
            assert_eq!(desc.total_steps, expected + 1);
            assert_eq!(desc.title, "Select Event Type");
        }
    }

    #[test]
    fn foreign_team_is_forbidden() {
        let mut context = ctx(true, true);
        context.team_id = Some(99);
        let err = resolve("accounts", &context, &with_event_types(), "Zoom").unwrap_err();
        assert_eq!(err, ResolutionError::ForbiddenTeam { team_id: 99 });

        context.team_id = Some(10);
        let desc = resolve("accounts", &context, &with_event_types(), "Zoom").unwrap();
        assert_eq!(desc.step, WizardStep::Accounts);
        assert_eq!(desc.ordinal, 0);
    }

    #[test]
    fn connect_step_for_oauth_app() {
        let desc = resolve("connect", &ctx(true, true), &Candidates::default(), "Zoom").unwrap();
        assert_eq!(desc.ordinal, 1);
        assert_eq!(desc.total_steps, 3);
        assert_eq!(desc.title, "Connect Zoom");
    }
}
