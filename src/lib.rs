/*!
# Almacen

A small browser form for keeping a warehouse inventory in a Google Sheets document.

## Overview

The spreadsheet is the only database. Every page load reads it, and every change is
written back straight away. Three editions of the form exist and are picked at start-up:

- **V1 (ledger)**: one product/quantity list on the document's first tab. Stock in and
  stock out update the product's row in place, or append a new row.
- **V2 / V3 (grid)**: one tab per client holding a nine-column table
  (`Date`, `Lot#`, `Initial`, `Product`, `Balance`, `GAN_1..4 (COGA 53)`). The visitor
  edits the whole table and saves it in one go, which overwrites the tab. The table can
  also be downloaded as CSV or XLSX.

V2 and V3 differ only in where the service-account credentials come from.

## Architecture

### Remote layer
- [`remote`]: the `SpreadsheetService` / `Document` / `Worksheet` traits
- [`sheets_api`]: Google Sheets over REST, authorized with a service-account JWT
- [`memory`]: in-process backend for tests and offline runs

### Core
- [`connector`]: credentials, connection and degraded mode
- [`tabs`]: open-or-create a client tab
- [`loader`]: tab → ledger or table
- [`ledger`]: stock in/out with keyed upsert
- [`saving`]: overwrite a tab with a table
- [`downloader`]: CSV / XLSX export

### Web layer
- [`session`]: per-visitor state with idle expiry
- [`app`]: axum routes

## Configuration

All settings come from `ALMACEN_*` environment variables (a `.env` file is honoured);
see [`config::Config`].
*/

#[cfg(feature = "web")]
pub mod app;
pub mod config;
pub mod connector;
pub mod credentials;
pub mod downloader;
pub mod error;
pub mod ledger;
pub mod loader;
pub mod memory;
pub mod remote;
pub mod saving;
#[cfg(feature = "web")]
pub mod session;
#[cfg(feature = "remote")]
pub mod sheets_api;
pub mod table;
pub mod tabs;

pub use config::{Config, Edition};
pub use error::{ConnectionError, InventoryError, RemoteError, Result};
pub use table::{InventoryRow, InventoryTable};
