//! Swipe-style review of auto-extracted code cards.
//!
//! A [`session::Session`] owns every card extracted from one repository. A
//! [`controller::ReviewController`] shows one pending card at a time, drawn by
//! the [`queue::CardQueue`], and applies the reviewer's approve/edit/skip
//! verdicts. Approved and edited cards are finally handed to a
//! [`submit::PullRequestSubmitter`] as a single pull request.

pub mod api;
pub mod card;
pub mod config;
pub mod controller;
pub mod queue;
pub mod report;
pub mod session;
pub mod source;
pub mod submit;
