// Libraries compiled in by build.rs for the target platform.
use crate::core::bundle::StaticBundle;

include!(concat!(env!("OUT_DIR"), "/embedded_libs.rs"));

pub fn bundle() -> StaticBundle {
    StaticBundle::new(EMBEDDED_LIBS)
}
