//! The session-assigner algorithm (§4.1, §8 scenarios 1-2). Pure over a
//! slice of unassigned observations and the already-existing sessions in the
//! bounded window, so it can be unit tested without a database and reused
//! identically by the Postgres-backed catalog.

use crate::error::{LibrarianError, Result};
use crate::catalog::CatalogBackend;
use librarian_model::{ObsId, Observation, ObservingSession, SessionId};

/// One new session to create, with the observations that join it.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSession {
    pub session: ObservingSession,
    pub member_obsids: Vec<ObsId>,
}

/// The full set of mutations `assign_observing_sessions` should commit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AssignmentPlan {
    pub existing_assignments: Vec<(ObsId, SessionId)>,
    pub new_sessions: Vec<NewSession>,
}

impl AssignmentPlan {
    pub fn is_empty(&self) -> bool {
        self.existing_assignments.is_empty() && self.new_sessions.is_empty()
    }
}

const MIN_GAP_DAYS: f64 = 1.0 / 1440.0;
const MAX_GAP_DAYS: f64 = 0.5;

/// Compute the session assignments for a batch of unassigned observations
/// (§4.1 steps 1-3). `observations` need not be pre-sorted.
pub fn plan_assignments(
    observations: Vec<Observation>,
    existing_sessions: &[ObservingSession],
) -> Result<AssignmentPlan> {
    let mut sorted = observations;
    sorted.sort_by(|a, b| {
        a.start_time_jd
            .partial_cmp(&b.start_time_jd)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut existing_assignments = Vec::new();
    let mut remaining = Vec::new();

    for obs in sorted {
        match find_containing_session(&obs, existing_sessions) {
            Some(session_id) => existing_assignments.push((obs.obsid, session_id)),
            None => remaining.push(obs),
        }
    }

    let new_sessions = cluster_into_sessions(&remaining)?;
    Ok(AssignmentPlan {
        existing_assignments,
        new_sessions,
    })
}

/// Fetch, plan, and commit (§4.1, §6 `assign_observing_sessions`). Each
/// existing-session assignment and each new session is committed as it's
/// produced, so a crash partway through still leaves earlier groups
/// correctly assigned and a repeat run resumes from there.
pub async fn assign_observing_sessions(
    catalog: &dyn CatalogBackend,
    min_start_jd: Option<f64>,
    max_start_jd: Option<f64>,
) -> Result<usize> {
    let observations = catalog
        .unassigned_observations(min_start_jd, max_start_jd)
        .await?;
    let existing_sessions = catalog.sessions_in_range(min_start_jd, max_start_jd).await?;
    let plan = plan_assignments(observations, &existing_sessions)?;

    let mut committed = 0;
    for (obsid, session_id) in &plan.existing_assignments {
        catalog.assign_observation_session(*obsid, *session_id).await?;
        committed += 1;
    }
    for new_session in &plan.new_sessions {
        catalog.create_session(&new_session.session).await?;
        for obsid in &new_session.member_obsids {
            catalog
                .assign_observation_session(*obsid, new_session.session.id)
                .await?;
        }
        committed += 1;
    }
    Ok(committed)
}

fn find_containing_session(
    obs: &Observation,
    sessions: &[ObservingSession],
) -> Option<SessionId> {
    sessions
        .iter()
        .find(|sess| {
            obs.start_time_jd >= sess.start_jd
                && obs.start_time_jd <= sess.stop_jd
                && obs.stop_time_jd.is_none_or(|stop| stop <= sess.stop_jd)
        })
        .map(|sess| sess.id)
}

/// Time-cluster the observations that matched no existing session (§4.1
/// step 3). An observation whose gap to the previous one lands exactly on
/// the clamp boundary stays in the earlier group (§8 boundary behavior).
fn cluster_into_sessions(obs: &[Observation]) -> Result<Vec<NewSession>> {
    let mut sessions = Vec::new();
    let n = obs.len();
    let mut i0 = 0;
    while i0 < n {
        if i0 + 1 == n {
            sessions.push(make_session(&obs[i0..n])?);
            break;
        }
        let gap0 = obs[i0 + 1].start_time_jd - obs[i0].start_time_jd;
        let threshold = (gap0 * 20.0).clamp(MIN_GAP_DAYS, MAX_GAP_DAYS);
        let mut i1 = i0 + 1;
        while i1 < n && (obs[i1].start_time_jd - obs[i1 - 1].start_time_jd) <= threshold {
            i1 += 1;
        }
        sessions.push(make_session(&obs[i0..i1])?);
        i0 = i1;
    }
    Ok(sessions)
}

fn make_session(group: &[Observation]) -> Result<NewSession> {
    let first = group[0];
    let last = group[group.len() - 1];
    let stop_jd = last
        .stop_time_jd
        .ok_or(LibrarianError::MissingStopTime(last.obsid.0))?;
    Ok(NewSession {
        session: ObservingSession::new(first.obsid.as_session_id(), first.start_time_jd, stop_jd),
        member_obsids: group.iter().map(|o| o.obsid).collect(),
    })
}
