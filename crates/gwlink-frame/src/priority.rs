//! Message priority bands.
//!
//! Priorities above [`FLASH`] are reserved for the control plane: [`AUTH`]
//! for the authorization handshake itself and [`CTRL`] for subscriptions,
//! heartbeats and other non-data traffic. Application data offered in that
//! band is degraded to [`FLASH`].

/// Authorization handshake messages only.
pub const AUTH: u8 = 127;

/// Control traffic: subscribe, pull, heartbeat.
pub const CTRL: u8 = 112;

/// Highest priority available to application data.
pub const FLASH: u8 = 96;

pub const URGENT: u8 = 64;

pub const IMPORTANT: u8 = 32;

/// Default priority for application data.
pub const NORMAL: u8 = 16;

pub const BACKGROUND: u8 = 0;

/// Clamp an application-supplied priority out of the control band.
pub fn clamp_data(priority: u8) -> u8 {
    if priority > FLASH {
        FLASH
    } else {
        priority
    }
}

/// Returns a human-readable name for the band a priority falls in.
pub fn band_name(priority: u8) -> &'static str {
    match priority {
        AUTH..=u8::MAX => "AUTH",
        CTRL..=126 => "CTRL",
        FLASH..=111 => "FLASH",
        URGENT..=95 => "URGENT",
        IMPORTANT..=63 => "IMPORTANT",
        NORMAL..=31 => "NORMAL",
        _ => "BACKGROUND",
    }
}
