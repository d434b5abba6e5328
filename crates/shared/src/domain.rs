use std::{borrow::Borrow, fmt, str::FromStr};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_ID_LEN: usize = 32;
pub const PINCODE_LEN: usize = 6;
pub const PHONE_NUMBER_LEN: usize = 10;
pub const GENERATED_ID_PREFIX: &str = "PWR";
const GENERATED_ID_MIN_DIGITS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurifierField {
    Id,
    Name,
    Location,
    HouseNoStreet,
    Area,
    Pincode,
    PhoneNumber,
}

impl fmt::Display for PurifierField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Location => "location",
            Self::HouseNoStreet => "houseNoStreet",
            Self::Area => "area",
            Self::Pincode => "pincode",
            Self::PhoneNumber => "phoneNumber",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("purifier id is required")]
    EmptyId,
    #[error("purifier id '{0}' must be 1-32 characters of letters, digits, '-' or '_'")]
    InvalidId(String),
    #[error("name is required")]
    EmptyName,
    #[error("{0} is required")]
    EmptyAddressField(PurifierField),
    #[error("pincode must be exactly 6 digits, got '{0}'")]
    InvalidPincode(String),
    #[error("phone number must be exactly 10 digits, got '{0}'")]
    InvalidPhoneNumber(String),
}

impl ValidationError {
    /// The input field that was rejected.
    pub fn field(&self) -> PurifierField {
        match self {
            Self::EmptyId | Self::InvalidId(_) => PurifierField::Id,
            Self::EmptyName => PurifierField::Name,
            Self::EmptyAddressField(field) => *field,
            Self::InvalidPincode(_) => PurifierField::Pincode,
            Self::InvalidPhoneNumber(_) => PurifierField::PhoneNumber,
        }
    }
}

/// Registry key. Letters, digits, `-` and `_`, compared case-sensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurifierId(String);

impl PurifierId {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyId);
        }
        let well_formed = trimmed.len() <= MAX_ID_LEN
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !well_formed {
            return Err(ValidationError::InvalidId(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn sequence_number(&self) -> Option<u64> {
        self.0
            .strip_prefix(GENERATED_ID_PREFIX)?
            .strip_prefix('-')?
            .parse()
            .ok()
    }
}

impl fmt::Display for PurifierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for PurifierId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl FromStr for PurifierId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Suggests `PWR-NNN` one past the highest generated-style id in `ids`.
pub fn next_sequential_id<'a>(ids: impl IntoIterator<Item = &'a PurifierId>) -> PurifierId {
    let next = ids
        .into_iter()
        .filter_map(PurifierId::sequence_number)
        .max()
        .map_or(1, |highest| highest.saturating_add(1));
    PurifierId(format!(
        "{GENERATED_ID_PREFIX}-{next:0width$}",
        width = GENERATED_ID_MIN_DIGITS
    ))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub house_no_street: String,
    pub area: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pincode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

impl Address {
    fn normalized(self) -> Result<Self, ValidationError> {
        let house_no_street = self.house_no_street.trim().to_string();
        if house_no_street.is_empty() {
            return Err(ValidationError::EmptyAddressField(
                PurifierField::HouseNoStreet,
            ));
        }
        let area = self.area.trim().to_string();
        if area.is_empty() {
            return Err(ValidationError::EmptyAddressField(PurifierField::Area));
        }

        let pincode = present(self.pincode);
        if let Some(pincode) = &pincode {
            if !is_digits_of_len(pincode, PINCODE_LEN) {
                return Err(ValidationError::InvalidPincode(pincode.clone()));
            }
        }
        let phone_number = present(self.phone_number);
        if let Some(phone_number) = &phone_number {
            if !is_digits_of_len(phone_number, PHONE_NUMBER_LEN) {
                return Err(ValidationError::InvalidPhoneNumber(phone_number.clone()));
            }
        }

        Ok(Self {
            house_no_street,
            area,
            pincode,
            phone_number,
        })
    }
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn is_digits_of_len(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|b| b.is_ascii_digit())
}

/// Where a unit is installed: a free-text site name or a customer address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Location {
    Site(String),
    Address(Address),
}

impl Location {
    pub fn site(name: impl Into<String>) -> Self {
        Self::Site(name.into())
    }

    /// The value matched by the exact location/area filter.
    pub fn area(&self) -> &str {
        match self {
            Self::Site(site) => site,
            Self::Address(address) => &address.area,
        }
    }

    fn searchable_fields(&self) -> Vec<&str> {
        match self {
            Self::Site(site) => vec![site.as_str()],
            Self::Address(address) => {
                let mut fields = vec![address.house_no_street.as_str(), address.area.as_str()];
                fields.extend(address.pincode.as_deref());
                fields.extend(address.phone_number.as_deref());
                fields
            }
        }
    }

    fn normalized(self) -> Result<Self, ValidationError> {
        match self {
            Self::Site(site) => {
                let site = site.trim().to_string();
                if site.is_empty() {
                    return Err(ValidationError::EmptyAddressField(PurifierField::Location));
                }
                Ok(Self::Site(site))
            }
            Self::Address(address) => address.normalized().map(Self::Address),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Site(site) => f.write_str(site),
            Self::Address(address) => {
                write!(f, "{}, {}", address.house_no_street, address.area)?;
                if let Some(pincode) = &address.pincode {
                    write!(f, " {pincode}")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurifierRecord {
    pub id: PurifierId,
    pub name: String,
    pub location: Location,
    pub status: bool,
    pub last_updated: DateTime<Utc>,
}

impl PurifierRecord {
    pub fn is_active(&self) -> bool {
        self.status
    }

    /// Re-checks a record received from a store or remote service.
    pub fn validated(self) -> Result<Self, ValidationError> {
        let last_updated = self.last_updated;
        NewPurifier::from(self)
            .validate()
            .map(|fields| fields.stamped(last_updated))
    }

    pub fn matches(&self, filter: &ListFilter) -> bool {
        if let Some(status) = filter.status {
            if status.is_active() != self.status {
                return false;
            }
        }
        if let Some(location) = &filter.location {
            if self.location.area() != location {
                return false;
            }
        }
        if let Some(date) = filter.date {
            if self.last_updated.date_naive() != date {
                return false;
            }
        }
        match filter.search_term() {
            Some(needle) => {
                let mut haystacks = vec![self.id.as_str(), self.name.as_str()];
                haystacks.extend(self.location.searchable_fields());
                haystacks
                    .into_iter()
                    .any(|field| field.to_lowercase().contains(&needle))
            }
            None => true,
        }
    }
}

/// Raw caller input for `add` and `update`; nothing here has been checked yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPurifier {
    pub id: String,
    pub name: String,
    pub location: Location,
    #[serde(default)]
    pub status: bool,
}

impl NewPurifier {
    pub fn validate(self) -> Result<PurifierFields, ValidationError> {
        let id = PurifierId::parse(&self.id)?;
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        let location = self.location.normalized()?;
        Ok(PurifierFields {
            id,
            name,
            location,
            status: self.status,
        })
    }
}

impl From<PurifierRecord> for NewPurifier {
    fn from(record: PurifierRecord) -> Self {
        Self {
            id: record.id.0,
            name: record.name,
            location: record.location,
            status: record.status,
        }
    }
}

/// Validated editable fields, waiting for a timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurifierFields {
    pub id: PurifierId,
    pub name: String,
    pub location: Location,
    pub status: bool,
}

impl PurifierFields {
    pub fn stamped(self, last_updated: DateTime<Utc>) -> PurifierRecord {
        PurifierRecord {
            id: self.id,
            name: self.name,
            location: self.location,
            status: self.status,
            last_updated,
        }
    }
}

/// Current time, forced strictly past `previous` so restamps always advance.
pub fn next_stamp(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match previous {
        Some(previous) if now <= previous => previous + Duration::microseconds(1),
        _ => now,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    Active,
    Inactive,
}

impl StatusFilter {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown status filter '{0}', expected active or inactive")]
pub struct UnknownStatusFilter(pub String);

impl FromStr for StatusFilter {
    type Err = UnknownStatusFilter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" | "online" => Ok(Self::Active),
            "inactive" | "offline" => Ok(Self::Inactive),
            other => Err(UnknownStatusFilter(other.to_string())),
        }
    }
}

/// Predicates for `list`. Unset predicates match everything; set ones are ANDed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub search: Option<String>,
    pub status: Option<StatusFilter>,
    pub location: Option<String>,
    pub date: Option<NaiveDate>,
}

impl ListFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn status(mut self, status: StatusFilter) -> Self {
        self.status = Some(status);
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(str::to_lowercase)
    }
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
