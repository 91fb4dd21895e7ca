//! Status display for the door controller.

pub mod presenter;

pub use presenter::{DisplaySink, LogDisplay, StatusPresenter, StatusSnapshot};
