// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Revu Contributors

//! Configuration module for Revu
//!
//! Handles loading, saving, and managing user settings.

pub mod settings;

pub use settings::*;
