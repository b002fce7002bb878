use clap::builder::{
	Styles,
	styling::{AnsiColor, Effects},
};
use serde::Serialize;

pub const VERSION: &str = concat!(
	env!("CARGO_PKG_VERSION"),
	"-",
	env!("VERGEN_GIT_SHA"),
	"-",
	env!("VERGEN_CARGO_TARGET_TRIPLE"),
);

/// Build identity reported by the status endpoint.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct BuildInfo {
	pub version: &'static str,
	pub git_sha: &'static str,
	pub target: &'static str,
}

pub const fn build_info() -> BuildInfo {
	BuildInfo {
		version: env!("CARGO_PKG_VERSION"),
		git_sha: env!("VERGEN_GIT_SHA"),
		target: env!("VERGEN_CARGO_TARGET_TRIPLE"),
	}
}

pub fn styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Cyan.on_default() | Effects::BOLD)
		.usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
		.literal(AnsiColor::Blue.on_default() | Effects::BOLD)
		.placeholder(AnsiColor::Green.on_default())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn version_starts_with_package_version() {
		let info = build_info();

		assert!(VERSION.starts_with(info.version), "Unexpected version string: {VERSION}");
		assert!(VERSION.ends_with(info.target), "Unexpected version string: {VERSION}");
	}
}
