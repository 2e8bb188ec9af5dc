//! UI Support Module
//!
//! Framework-agnostic plumbing for front ends: controllers that run
//! discovery and transfers on background threads, and the event types they
//! emit. The bundled CLI is one consumer; a graphical front end would poll
//! the same channels.
//!
//! # Threading Model
//!
//! 1. **Event Channels** - Workers send events over `crossbeam-channel`
//!    receivers that the front end can drain without blocking
//! 2. **Atomic State** - Controller state is an atomic, so status checks
//!    never wait on the worker
//! 3. **Cancellation** - Each run gets its own cancellation token, checked
//!    between files and between discovery steps
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use iphone_media_transfer::core::config::Config;
//! use iphone_media_transfer::core::transfer::TransferConfig;
//! use iphone_media_transfer::device::Discovery;
//! use iphone_media_transfer::ui::{DiscoveryController, TransferController, TransferEvent};
//!
//! let config = Config::default();
//! let discovery = DiscoveryController::new();
//! let outcome = discovery.run_blocking(Discovery::from_config(&config.discovery), |event| {
//!     println!("{:?}", event);
//! });
//!
//! if let Some(handle) = outcome.handle() {
//!     let controller = TransferController::new();
//!     let events = controller
//!         .start_transfer(handle.clone(), TransferConfig::with_destination(config.destination()))
//!         .unwrap();
//!     for event in events.iter() {
//!         if let TransferEvent::Progress(update) = &event {
//!             println!("{}%", update.percent);
//!         }
//!         if event.is_terminal() {
//!             break;
//!         }
//!     }
//! }
//! ```

pub mod controller;
pub mod events;

pub use controller::{ControllerState, DiscoveryController, TransferController};

pub use events::{format_bytes, format_duration, DiscoveryEvent, TransferEvent, UiEvent};
