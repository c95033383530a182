/// Maps a product title to the display title stored on a queue entry. The
/// real localization dictionary lives outside this pipeline; this is the
/// seam it plugs into.
pub trait TitleLocalizer: Send + Sync {
    fn localize(&self, title: &str) -> String;
}

/// Default localizer: the display title mirrors the source title and the
/// review workflow supplies the manual translation later.
pub struct Passthrough;

impl TitleLocalizer for Passthrough {
    fn localize(&self, title: &str) -> String {
        title.to_string()
    }
}
