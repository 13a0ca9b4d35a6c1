//! Context loader. Reads the records a wizard step depends on and
//! normalizes them into resolver and page shapes.

use tracing::debug;

use crate::error::WizardFailure;
use crate::store::{Credential, Database, EventType};

use super::model::{AccountOption, AppSummary, Candidates, EventTypeOption, WizardContext};

/// Everything a wizard step needs, fetched for one request.
#[derive(Debug, Clone)]
pub struct LoadedContext {
    pub context: WizardContext,
    pub candidates: Candidates,
    pub app: AppSummary,
    /// The caller's personal account followed by their accepted teams.
    pub accounts: Vec<AccountOption>,
}

/// Load the wizard context for `user_id` installing `app_slug`.
///
/// Event types come from the team when `team_id` is given, otherwise from
/// the caller's personal event types. Membership of `team_id` is not
/// checked here; the resolver does that.
pub async fn load_context(
    db: &dyn Database,
    user_id: i64,
    app_slug: &str,
    team_id: Option<i64>,
) -> Result<LoadedContext, WizardFailure> {
    let user = db
        .get_user(user_id)
        .await?
        .ok_or(WizardFailure::UserNotFound { user_id })?;

    let app = db
        .get_app(app_slug)
        .await?
        .ok_or_else(|| WizardFailure::AppNotFound {
            slug: app_slug.to_string(),
        })?;
    if !app.enabled {
        return Err(WizardFailure::AppNotEnabled {
            slug: app_slug.to_string(),
        });
    }

    let teams = db.list_accepted_teams(user.id).await?;
    let team_ids: Vec<i64> = teams.iter().map(|t| t.id).collect();

    let installed = db.list_app_credentials(&app.slug, user.id, &team_ids).await?;

    let event_types = match team_id {
        Some(team_id) => db.list_team_event_types(team_id).await?,
        None => db.list_user_event_types(user.id).await?,
    };

    let mut accounts = Vec::with_capacity(teams.len() + 1);
    accounts.push(AccountOption {
        id: user.id,
        name: user.name.clone(),
        logo_url: None,
        is_team: false,
        already_installed: installed.iter().any(|c| c.user_id == Some(user.id)),
    });
    accounts.extend(teams.into_iter().map(|team| AccountOption {
        already_installed: is_installed_for_team(&installed, team.id),
        id: team.id,
        name: team.name,
        logo_url: team.logo_url,
        is_team: true,
    }));

    debug!(
        user_id,
        app = %app.slug,
        teams = team_ids.len(),
        event_types = event_types.len(),
        "Wizard context loaded"
    );

    Ok(LoadedContext {
        context: WizardContext {
            has_teams: !team_ids.is_empty(),
            is_oauth_app: app.is_oauth,
            team_id,
            user_id: user.id,
            app_slug: app.slug.clone(),
        },
        candidates: Candidates {
            team_ids,
            event_types: sort_event_types(event_types),
        },
        app: AppSummary {
            slug: app.slug,
            name: app.name,
            logo_url: app.logo_url,
            is_oauth: app.is_oauth,
        },
        accounts,
    })
}

fn is_installed_for_team(installed: &[Credential], team_id: i64) -> bool {
    installed.iter().any(|c| c.team_id == Some(team_id))
}

/// Highest position first; ties keep ascending id.
fn sort_event_types(event_types: Vec<EventType>) -> Vec<EventTypeOption> {
    let mut options: Vec<EventTypeOption> = event_types
        .into_iter()
        .map(|e| EventTypeOption {
            id: e.id,
            title: e.title,
            slug: e.slug,
            length_minutes: e.length_minutes,
            position: e.position,
            team_id: e.team_id,
        })
        .collect();
    options.sort_by(|a, b| b.position.cmp(&a.position).then(a.id.cmp(&b.id)));
    options
}
