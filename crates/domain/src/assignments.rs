use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::auth::Role;
use crate::error::DomainError;
use crate::identity::ActorIdentity;
use crate::ports::assignments::AssignmentRepository;
use crate::ports::projects::MembershipRepository;
use crate::ports::segments::SegmentRepository;
use crate::util::now_ms;

const MAX_NOTES_LENGTH: usize = 1000;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Active,
    Completed,
    Cancelled,
}

impl AssignmentStatus {
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "active" => Some(AssignmentStatus::Active),
            "completed" => Some(AssignmentStatus::Completed),
            "cancelled" => Some(AssignmentStatus::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Active => "active",
            AssignmentStatus::Completed => "completed",
            AssignmentStatus::Cancelled => "cancelled",
        }
    }
}

/// Scheduling record for a contractor on a road segment. Never deleted;
/// lifecycle is tracked through `status`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    pub assignment_id: String,
    pub segment_id: String,
    pub contractor_id: String,
    pub status: AssignmentStatus,
    pub starts_at_ms: i64,
    pub ends_at_ms: i64,
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Clone, Debug)]
pub struct AssignmentSchedule {
    pub contractor_id: String,
    pub starts_at_ms: i64,
    pub ends_at_ms: i64,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SegmentState {
    Active,
    Completed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SegmentStatus {
    pub status: SegmentState,
    pub active_assignment: Option<Assignment>,
    /// Assignments skipped because their window has start >= end. Reported
    /// back so the caller can log them; the resolver itself stays silent.
    pub malformed_window_ids: Vec<String>,
}

/// Derives a segment's displayed state at `now_ms` from its assignment
/// windows. Only `active` assignments whose window contains `now_ms` count;
/// with several qualifying, the earliest start wins and equal starts fall
/// back to the lowest assignment id.
pub fn segment_status_at(segment_id: &str, assignments: &[Assignment], now_ms: i64) -> SegmentStatus {
    let on_segment = assignments
        .iter()
        .filter(|assignment| assignment.segment_id == segment_id);

    let mut malformed_window_ids = Vec::new();
    let mut qualifying: Vec<&Assignment> = Vec::new();
    for assignment in on_segment {
        if assignment.starts_at_ms >= assignment.ends_at_ms {
            malformed_window_ids.push(assignment.assignment_id.clone());
            continue;
        }
        if assignment.status != AssignmentStatus::Active {
            continue;
        }
        if assignment.starts_at_ms <= now_ms && now_ms <= assignment.ends_at_ms {
            qualifying.push(assignment);
        }
    }

    qualifying.sort_by(|left, right| {
        left.starts_at_ms
            .cmp(&right.starts_at_ms)
            .then_with(|| left.assignment_id.cmp(&right.assignment_id))
    });

    match qualifying.first() {
        Some(assignment) => SegmentStatus {
            status: SegmentState::Active,
            active_assignment: Some((*assignment).clone()),
            malformed_window_ids,
        },
        None => SegmentStatus {
            status: SegmentState::Completed,
            active_assignment: None,
            malformed_window_ids,
        },
    }
}

#[derive(Clone)]
pub struct AssignmentService {
    assignments: Arc<dyn AssignmentRepository>,
    segments: Arc<dyn SegmentRepository>,
    members: Arc<dyn MembershipRepository>,
}

impl AssignmentService {
    pub fn new(
        assignments: Arc<dyn AssignmentRepository>,
        segments: Arc<dyn SegmentRepository>,
        members: Arc<dyn MembershipRepository>,
    ) -> Self {
        Self {
            assignments,
            segments,
            members,
        }
    }

    pub async fn schedule(
        &self,
        actor: ActorIdentity,
        segment_id: &str,
        input: AssignmentSchedule,
    ) -> DomainResult<Assignment> {
        let payload = validate_assignment_schedule(&input)?;
        self.segments
            .get(segment_id)
            .await?
            .ok_or(DomainError::NotFound)?;

        let now = now_ms();
        let assignment = Assignment {
            assignment_id: crate::util::uuid_v7_without_dashes(),
            segment_id: segment_id.to_string(),
            contractor_id: payload.contractor_id,
            status: AssignmentStatus::Active,
            starts_at_ms: payload.starts_at_ms,
            ends_at_ms: payload.ends_at_ms,
            notes: payload.notes,
            created_by: actor.user_id,
            created_at_ms: now,
            updated_at_ms: now,
        };
        self.assignments.create(&assignment).await
    }

    pub async fn update_status(
        &self,
        assignment_id: &str,
        status: AssignmentStatus,
    ) -> DomainResult<Assignment> {
        self.assignments
            .update_status(assignment_id, status, now_ms())
            .await
    }

    pub async fn list_for_segment(
        &self,
        role: &Role,
        user_id: &str,
        segment_id: &str,
    ) -> DomainResult<Vec<Assignment>> {
        let segment = self
            .segments
            .get(segment_id)
            .await?
            .ok_or(DomainError::NotFound)?;

        if !role.is_admin() {
            let membership = self.members.get(&segment.project_id, user_id).await?;
            if membership.is_none() {
                return Err(DomainError::Forbidden(
                    "not a member of this project".into(),
                ));
            }
        }
        self.assignments.list_by_segment(segment_id).await
    }
}

fn validate_assignment_schedule(input: &AssignmentSchedule) -> DomainResult<AssignmentSchedule> {
    let contractor_id = input.contractor_id.trim().to_string();
    if contractor_id.is_empty() {
        return Err(DomainError::Validation("contractor_id is required".into()));
    }

    if input.starts_at_ms >= input.ends_at_ms {
        return Err(DomainError::Validation(
            "assignment window start must precede end".into(),
        ));
    }

    if let Some(notes) = &input.notes {
        if notes.chars().count() > MAX_NOTES_LENGTH {
            return Err(DomainError::Validation(format!(
                "notes exceed max length of {MAX_NOTES_LENGTH}"
            )));
        }
    }

    Ok(AssignmentSchedule {
        contractor_id,
        starts_at_ms: input.starts_at_ms,
        ends_at_ms: input.ends_at_ms,
        notes: input.notes.clone(),
    })
}
