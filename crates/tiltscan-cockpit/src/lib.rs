//! `tiltscan-cockpit` – HTTP front-end for the scan service.
//!
//! Exposes the host-facing operations of a
//! [`ScanService`][tiltscan_runtime::ScanService] over plain HTTP so a
//! browser or `curl` can start a sweep, poll its progress and download the
//! resulting mesh, point cloud and height map.  See [`server`] for the route
//! table.
//!
//! # Usage
//!
//! ```rust,no_run
//! use tiltscan_cockpit::CockpitServer;
//! # async fn demo(service: tiltscan_runtime::ScanService) {
//! CockpitServer::new(service, Default::default())
//!     .with_port(8000)
//!     .run()
//!     .await
//!     .expect("cockpit server failed");
//! # }
//! ```

pub mod server;

pub use server::{CockpitError, CockpitServer, DEFAULT_PORT, Response, route};
