// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Runtime settings.
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables prefixed with `HOSTEL_FEES` (`HOSTEL_FEES__FEE__TARGET=250000`).

use crate::summary::{DEFAULT_FEE_TARGET, FeeSchedule};
use crate::{DEFAULT_PAYER_PHONE, LedgerError};
use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config/hostel-fees.toml";
const ENV_PREFIX: &str = "HOSTEL_FEES";

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub fee: FeeSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub issuer: IssuerSettings,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FeeSettings {
    #[serde(default = "default_target")]
    pub target: Decimal,
}

impl Default for FeeSettings {
    fn default() -> Self {
        FeeSettings {
            target: default_target(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct IssuerSettings {
    /// Phone number sent to the gateway when the payer gave none.
    #[serde(default = "default_payer_phone")]
    pub payer_phone_fallback: String,
    /// Take payments in-page instead of issuing hosted-page references.
    #[serde(default)]
    pub direct_charge: bool,
}

impl Default for IssuerSettings {
    fn default() -> Self {
        IssuerSettings {
            payer_phone_fallback: default_payer_phone(),
            direct_charge: false,
        }
    }
}

fn default_target() -> Decimal {
    DEFAULT_FEE_TARGET
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_payer_phone() -> String {
    DEFAULT_PAYER_PHONE.to_string()
}

impl Settings {
    /// Loads settings from `path` (optional) and the environment.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Validated fee schedule for the engine.
    pub fn fee_schedule(&self) -> Result<FeeSchedule, LedgerError> {
        FeeSchedule::new(self.fee.target)
    }
}
