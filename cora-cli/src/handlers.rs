use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use cora_core::types::{SlotId, FREE_SUBJECT};

// ─── Validation Helpers ─────────────────────────────────────────────────────

fn require(field: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        Err(format!("{} is required", field))
    } else {
        Ok(())
    }
}

fn validate_slot(field: &str, slot: SlotId) -> Result<(), String> {
    if slot == 0 {
        Err(format!("{} must be 1 or greater", field))
    } else {
        Ok(())
    }
}

/// Most slots a single booking request may span. No teaching day has more.
pub const MAX_RANGE_SLOTS: SlotId = 24;

// ─── Request Types ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct FreeRoomsQuery {
    pub slot: SlotId,
    pub date: NaiveDate,
}

impl FreeRoomsQuery {
    pub fn validate(&self) -> Result<(), String> {
        validate_slot("slot", self.slot)
    }
}

#[derive(Deserialize)]
pub struct RoomDayQuery {
    pub room: String,
    pub date: NaiveDate,
}

impl RoomDayQuery {
    pub fn validate(&self) -> Result<(), String> {
        require("room", &self.room)
    }
}

#[derive(Deserialize)]
pub struct BookingRequest {
    pub room: String,
    pub date: NaiveDate,
    pub slot: SlotId,
    /// Last slot of a contiguous range; a single slot when absent.
    pub end_slot: Option<SlotId>,
    pub instructor: String,
    pub subject: String,
}

impl BookingRequest {
    pub fn validate(&self) -> Result<(), String> {
        require("room", &self.room)?;
        require("instructor", &self.instructor)?;
        require("subject", &self.subject)?;
        validate_slot("slot", self.slot)?;
        if self.subject == FREE_SUBJECT {
            return Err(format!("subject '{}' cannot be booked", FREE_SUBJECT));
        }
        if let Some(end) = self.end_slot {
            if end < self.slot {
                return Err(format!("end_slot {} is before slot {}", end, self.slot));
            }
            if end - self.slot >= MAX_RANGE_SLOTS {
                return Err(format!("a booking may span at most {} slots", MAX_RANGE_SLOTS));
            }
        }
        Ok(())
    }

    pub fn last_slot(&self) -> SlotId {
        self.end_slot.unwrap_or(self.slot)
    }
}

#[derive(Deserialize)]
pub struct CancelQuery {
    pub room: String,
    pub date: NaiveDate,
    pub slot: SlotId,
}

impl CancelQuery {
    pub fn validate(&self) -> Result<(), String> {
        require("room", &self.room)?;
        validate_slot("slot", self.slot)
    }
}

#[derive(Deserialize)]
pub struct BookingsQuery {
    pub instructor: String,
}

impl BookingsQuery {
    pub fn validate(&self) -> Result<(), String> {
        require("instructor", &self.instructor)
    }
}

// ─── Response Types ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }

    /// Evaluated and refused: carries the outcome alongside the reason.
    pub fn rejected(data: T, msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Some(data),
            error: Some(msg.into()),
        }
    }
}

#[derive(Serialize)]
pub struct ReservationResponse {
    pub reserved: usize,
    pub requested: usize,
}

#[derive(Serialize)]
pub struct CancelResponse {
    pub canceled: bool,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub rooms: usize,
    pub version: String,
}
