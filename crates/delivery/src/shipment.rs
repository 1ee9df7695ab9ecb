use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use orderflow_core::{DomainError, DomainResult, ValueObject};

/// Recipient captured when the order is placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsigneeInfo {
    pub name: String,
    pub phone: String,
    pub address: String,
    #[serde(default)]
    pub remark: Option<String>,
}

impl ConsigneeInfo {
    pub fn new(
        name: impl Into<String>,
        phone: impl Into<String>,
        address: impl Into<String>,
        remark: Option<String>,
    ) -> DomainResult<Self> {
        let info = Self {
            name: name.into().trim().to_string(),
            phone: phone.into().trim().to_string(),
            address: address.into().trim().to_string(),
            remark: non_blank(remark),
        };
        info.validate()?;
        Ok(info)
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("consignee name cannot be empty"));
        }
        if self.phone.trim().is_empty() {
            return Err(DomainError::validation("consignee phone cannot be empty"));
        }
        if self.address.trim().is_empty() {
            return Err(DomainError::validation("delivery address cannot be empty"));
        }
        Ok(())
    }
}

impl ValueObject for ConsigneeInfo {}

/// Carrier-side fields of a delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracking {
    pub tracking_no: Option<String>,
    pub shipper: Option<String>,
    pub estimate_time: Option<DateTime<Utc>>,
    pub ship_time: Option<DateTime<Utc>>,
    pub delivery_time: Option<DateTime<Utc>>,
}

/// Edits applied on shipment or by a details update. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentDetails {
    pub tracking_no: Option<String>,
    pub shipper: Option<String>,
    pub estimate_time: Option<DateTime<Utc>>,
}

impl ShipmentDetails {
    pub fn new(
        tracking_no: Option<String>,
        shipper: Option<String>,
        estimate_time: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            tracking_no: non_blank(tracking_no),
            shipper: non_blank(shipper),
            estimate_time,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tracking_no.is_none() && self.shipper.is_none() && self.estimate_time.is_none()
    }
}

impl ValueObject for ShipmentDetails {}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse an estimated arrival time.
///
/// Accepted: RFC 3339, `YYYY-MM-DDTHH:MM:SS[.fff]`, `YYYY-MM-DD HH:MM:SS` and a bare
/// `YYYY-MM-DD` (midnight). Times without an offset are taken as UTC.
pub fn parse_estimate_time(raw: &str) -> DomainResult<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(DomainError::validation("estimate time cannot be empty"));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    let naive = if raw.contains('T') {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()
    } else if raw.len() == 10 {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    } else {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").ok()
    };

    naive
        .map(|n| n.and_utc())
        .ok_or_else(|| DomainError::validation(format!("unrecognized estimate time: {raw}")))
}
