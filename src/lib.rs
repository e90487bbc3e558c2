// Closed-loop DC motor position control with a serial telemetry link
//
// - motor:    encoder tracking, PWM driver, proportional controller, simulated plant
// - messages: configuration and telemetry line formats
// - link:     serial transport for both ends
// - runtime:  periodic task scheduling on the device
// - host:     configuration prompt, telemetry collection and plotting

pub mod config;
pub mod host;
pub mod link;
pub mod messages;
pub mod motor;
pub mod runtime;
