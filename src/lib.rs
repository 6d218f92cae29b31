//! # journeyGenie backend
//!
//! REST backend for an AI travel planner. Users sign up, get a JWT session
//! cookie, spend tokens on generated itineraries, blogs, photo uploads and
//! slideshow videos, and keep their tours as a tree of days, activities and
//! photos in SQLite.

pub mod auth;
pub mod blog;
pub mod config;
pub mod database;
pub mod error;
pub mod gemini;
pub mod geo;
pub mod ledger;
pub mod logging;
pub mod media;
pub mod photo;
pub mod plan;
pub mod server;
pub mod tour;
pub mod user;
pub mod video;
