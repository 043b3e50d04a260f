

#[derive(Debug, PartialEq, Eq)]
pub enum PresentMode
{
	Panic,
	LogOnly,
	Interactive,
}

#[cfg(feature="panic_on_failures")]
mod cfg
{
	use super::PresentMode;

	pub const ENABLE_ASSERTS 	: bool 			= true;
	pub const PRESENT_MODE 		: PresentMode	= PresentMode::Panic;
}

#[cfg(not(feature="panic_on_failures"))]
mod cfg
{
	use super::PresentMode;

	#[cfg(feature="enable_asserts")] 			pub const ENABLE_ASSERTS 	: bool 			= true;
	#[cfg(not(feature="enable_asserts"))] 		pub const ENABLE_ASSERTS 	: bool 			= false;

	#[cfg(feature="interactive_failures")] 		pub const PRESENT_MODE 		: PresentMode	= PresentMode::Interactive;
	#[cfg(not(feature="interactive_failures"))] pub const PRESENT_MODE 		: PresentMode	= PresentMode::LogOnly;
}

pub use cfg::*;

#[cfg(feature="enable_trace")] 		pub const ENABLE_TRACE 	: bool = true;
#[cfg(not(feature="enable_trace"))] pub const ENABLE_TRACE 	: bool = false;



// A category that has never been configured answers at volume 1; the master
//  volume starts high enough that per-category settings are what you hear.

pub const DEFAULT_CATEGORY_VOLUME 	: i32 = 1;
pub const DEFAULT_MASTER_VOLUME 	: i32 = 10;
