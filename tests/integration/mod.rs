//! Integration tests for archive post resolution and backlinks

mod support;

mod cache_tier;
mod cli_commands;
mod config_integration;
mod expansion;
mod fetch_adapter;
mod remote_backlinks;
mod site_schema;
mod user_state;
