//! PDF rasterisation contract.
//!
//! Rendering PDF pages to images is delegated to an external collaborator.
//! The toolkit only defines the trait; scanned PDFs analysed without a
//! rasteriser installed produce a structured dependency failure rather
//! than a crash.

/// Default rasterisation density in dots per inch.
pub const DEFAULT_RASTER_DPI: u32 = 200;

/// Renders PDF pages to encoded images the image analyzer can consume.
pub trait PdfRasterizer: Send + Sync {
    /// Renders every page at the given DPI, returning one encoded image
    /// (PNG or JPEG bytes) per page in page order.
    fn rasterize(&self, pdf_bytes: &[u8], dpi: u32) -> Result<Vec<Vec<u8>>, String>;
}
