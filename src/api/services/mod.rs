pub mod admin;
pub mod ads;
pub mod commissions;
pub mod conversions;
pub mod health;
pub mod redirect;

pub use admin::admin_routes;
pub use ads::{AdsService, ads_routes};
pub use commissions::{CommissionService, commission_routes};
pub use conversions::{ConversionService, conversion_routes};
pub use health::{HealthService, health_routes};
pub use redirect::{RedirectService, redirect_routes};
