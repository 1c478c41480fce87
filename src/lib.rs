//! Site companion library.
//!
//! A service that republishes images from a personal site's feed to
//! social platforms (bluesky, pixelfed, instagram) and reconciles each
//! published item with the canonical platform record via perceptual
//! image hashing.

pub mod backfill;
pub mod caption;
pub mod config;
pub mod db;
pub mod feed;
pub mod fingerprint;
pub mod interactions;
pub mod platforms;
pub mod publish;
pub mod retry;
pub mod scheduler;
pub mod selector;
pub mod web;
