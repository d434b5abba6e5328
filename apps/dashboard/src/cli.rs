use anyhow::{bail, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use shared::domain::{
    Address, ListFilter, Location, NewPurifier, PurifierId, PurifierRecord, StatusFilter,
};

use crate::config::CliOverrides;

/// Operator console for the purifier fleet.
#[derive(Parser, Debug)]
#[command(name = "dashboard")]
pub struct Cli {
    /// Record service base url, e.g. http://127.0.0.1:8080
    #[arg(long, global = true)]
    pub server_url: Option<String>,
    /// Local cache database (file path or sqlite url)
    #[arg(long, global = true)]
    pub cache_url: Option<String>,
    /// Work only against the local cache
    #[arg(long, global = true)]
    pub offline: bool,
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            server_url: self.server_url.clone(),
            cache_url: self.cache_url.clone(),
            offline: self.offline,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show purifiers matching every given filter
    List(ListArgs),
    /// Register a purifier, or replace the one with the same id
    Add(AddArgs),
    /// Flip a purifier between active and inactive
    Toggle { id: String },
    /// Edit name, location or status of an existing purifier
    Update(UpdateArgs),
    /// Delete a purifier; unknown ids are ignored
    Remove { id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusChoice {
    Active,
    Inactive,
    All,
}

impl StatusChoice {
    fn filter(self) -> Option<StatusFilter> {
        match self {
            Self::Active => Some(StatusFilter::Active),
            Self::Inactive => Some(StatusFilter::Inactive),
            Self::All => None,
        }
    }
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(long)]
    pub search: Option<String>,
    #[arg(long, value_enum, default_value_t = StatusChoice::All)]
    pub status: StatusChoice,
    /// Exact site name or address area
    #[arg(long)]
    pub location: Option<String>,
    /// UTC day of the last update, YYYY-MM-DD
    #[arg(long)]
    pub date: Option<NaiveDate>,
    #[arg(long)]
    pub json: bool,
}

impl ListArgs {
    pub fn filter(&self) -> ListFilter {
        ListFilter {
            search: self.search.clone(),
            status: self.status.filter(),
            location: self.location.clone(),
            date: self.date,
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct LocationArgs {
    /// Free-text site name
    #[arg(long, conflicts_with_all = ["street", "area", "pincode", "phone"])]
    pub site: Option<String>,
    #[arg(long)]
    pub street: Option<String>,
    #[arg(long)]
    pub area: Option<String>,
    #[arg(long)]
    pub pincode: Option<String>,
    #[arg(long)]
    pub phone: Option<String>,
}

impl LocationArgs {
    fn is_empty(&self) -> bool {
        self.site.is_none()
            && self.street.is_none()
            && self.area.is_none()
            && self.pincode.is_none()
            && self.phone.is_none()
    }

    /// Applies the given flags over `current`; address flags fill in from the
    /// current address when it has one.
    fn merged_onto(self, current: Option<&Location>) -> Option<Location> {
        if self.is_empty() {
            return current.cloned();
        }
        if let Some(site) = self.site {
            return Some(Location::Site(site));
        }
        let base = match current {
            Some(Location::Address(address)) => address.clone(),
            _ => Address {
                house_no_street: String::new(),
                area: String::new(),
                pincode: None,
                phone_number: None,
            },
        };
        Some(Location::Address(Address {
            house_no_street: self.street.unwrap_or(base.house_no_street),
            area: self.area.unwrap_or(base.area),
            pincode: self.pincode.or(base.pincode),
            phone_number: self.phone.or(base.phone_number),
        }))
    }
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Defaults to the next free PWR-NNN id
    #[arg(long)]
    pub id: Option<String>,
    #[arg(long)]
    pub name: String,
    #[command(flatten)]
    pub location: LocationArgs,
    #[arg(long)]
    pub active: bool,
}

impl AddArgs {
    pub fn into_new_purifier(self, generated_id: &PurifierId) -> Result<NewPurifier> {
        let Some(location) = self.location.merged_onto(None) else {
            bail!("a location is required: pass --site, or --street and --area");
        };
        Ok(NewPurifier {
            id: self.id.unwrap_or_else(|| generated_id.to_string()),
            name: self.name,
            location,
            status: self.active,
        })
    }
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    pub id: String,
    #[arg(long)]
    pub name: Option<String>,
    #[command(flatten)]
    pub location: LocationArgs,
    #[arg(long, value_parser = parse_status)]
    pub status: Option<bool>,
}

impl UpdateArgs {
    pub fn apply(self, current: PurifierRecord) -> PurifierRecord {
        let location = self
            .location
            .merged_onto(Some(&current.location))
            .unwrap_or_else(|| current.location.clone());
        PurifierRecord {
            name: self.name.unwrap_or(current.name),
            location,
            status: self.status.unwrap_or(current.status),
            ..current
        }
    }
}

fn parse_status(raw: &str) -> Result<bool, String> {
    raw.parse::<StatusFilter>()
        .map(StatusFilter::is_active)
        .map_err(|err| err.to_string())
}

#[cfg(test)]
#[path = "tests/cli_tests.rs"]
mod tests;
