use crate::brand::{Brand, BrandProtocol};

/// Streaming-only cameras: every slot is empty
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericProtocol;

impl BrandProtocol for GenericProtocol {
    fn brand(&self) -> Brand {
        Brand::Generic
    }
}
