//! Field table for proposal records.
//!
//! Every known proposal field appears exactly once here with its relational
//! column name, its document field name and the kind of coercion applied when
//! crossing between the two stores.

use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator};

/// How a field's value is encoded on each side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Number on both sides.
    Integer,
    /// String on both sides.
    Text,
    /// Decimal string in the relational store, number in the document store.
    Decimal,
    /// `YYYY-MM-DD` in the relational store, ISO datetime at UTC midnight in
    /// the document store.
    Date,
    /// RFC 3339 on both sides, normalised to UTC.
    Timestamp,
    /// JSON-encoded string in the relational store, native array in the
    /// document store.
    JsonArray
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum ProposalField {
    Id,
    OrganizationId,
    OrganizationName,
    OrganizationType,
    ContactPerson,
    ContactEmail,
    ContactPhone,
    EventName,
    EventDescription,
    EventStartDate,
    EventEndDate,
    Venue,
    EventMode,
    ExpectedParticipants,
    Budget,
    SdgGoals,
    Objectives,
    ProposalStatus,
    AdminComments,
    CreatedAt,
    UpdatedAt
}

impl ProposalField {
    pub fn all() -> impl Iterator<Item = ProposalField> {
        ProposalField::iter()
    }

    pub fn column(self) -> &'static str {
        match self {
            ProposalField::Id => "id",
            ProposalField::OrganizationId => "organization_id",
            ProposalField::OrganizationName => "organization_name",
            ProposalField::OrganizationType => "organization_type",
            ProposalField::ContactPerson => "contact_person",
            ProposalField::ContactEmail => "contact_email",
            ProposalField::ContactPhone => "contact_phone",
            ProposalField::EventName => "event_name",
            ProposalField::EventDescription => "event_description",
            ProposalField::EventStartDate => "event_start_date",
            ProposalField::EventEndDate => "event_end_date",
            ProposalField::Venue => "venue",
            ProposalField::EventMode => "event_mode",
            ProposalField::ExpectedParticipants => "expected_participants",
            ProposalField::Budget => "budget",
            ProposalField::SdgGoals => "sdg_goals",
            ProposalField::Objectives => "objectives",
            ProposalField::ProposalStatus => "proposal_status",
            ProposalField::AdminComments => "admin_comments",
            ProposalField::CreatedAt => "created_at",
            ProposalField::UpdatedAt => "updated_at"
        }
    }

    pub fn document_field(self) -> &'static str {
        match self {
            ProposalField::Id => "proposalId",
            other => other.column()
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            ProposalField::Id
            | ProposalField::OrganizationId
            | ProposalField::ExpectedParticipants => FieldKind::Integer,
            ProposalField::Budget => FieldKind::Decimal,
            ProposalField::EventStartDate | ProposalField::EventEndDate => FieldKind::Date,
            ProposalField::CreatedAt | ProposalField::UpdatedAt => FieldKind::Timestamp,
            ProposalField::SdgGoals | ProposalField::Objectives => FieldKind::JsonArray,
            _ => FieldKind::Text
        }
    }

    /// Fields the document side may write back into the relational store.
    ///
    /// Identity, ownership, workflow state and audit timestamps are owned by
    /// the relational store and never leave this list.
    pub fn syncable_from_document(self) -> bool {
        !matches!(
            self,
            ProposalField::Id
                | ProposalField::OrganizationId
                | ProposalField::OrganizationName
                | ProposalField::ProposalStatus
                | ProposalField::AdminComments
                | ProposalField::CreatedAt
                | ProposalField::UpdatedAt
        )
    }

    pub fn from_column(column: &str) -> Option<ProposalField> {
        ProposalField::iter().find(|f| f.column() == column)
    }

    pub fn from_document_field(name: &str) -> Option<ProposalField> {
        ProposalField::iter().find(|f| f.document_field() == name)
    }
}

impl std::fmt::Display for ProposalField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.column())
    }
}
