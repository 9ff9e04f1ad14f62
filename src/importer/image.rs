use tracing::{debug, info};

use crate::{
    error_log::Label,
    fetch::{SourceName, remove_temp},
    log_error,
    store::{ContentStore, MediaId, PostId},
};

impl<S: ContentStore> super::Importer<S> {
    /// Finds or uploads one image. An attachment already titled with the source's file stem
    /// is reused, so repeated runs never upload the same image twice.
    ///
    /// Failures are logged and yield `None`.
    pub async fn resolve_image(&mut self, post: PostId, source: &str) -> Option<MediaId> {
        let name = SourceName::parse(source);

        match self.store.find_attachment(&name.stem).await {
            Ok(Some(media)) => {
                debug!(%post, %media, source, "image already uploaded");
                return Some(media);
            }
            Ok(None) => {}
            Err(error) => {
                log_error!(
                    self.errors,
                    Label::PostImage,
                    "Error looking up image {source:?} for post {post}: {error}"
                );
                return None;
            }
        }

        let temp = match self.store.fetch_to_temp(source).await {
            Ok(temp) => temp,
            Err(error) => {
                log_error!(
                    self.errors,
                    Label::PostImage,
                    "Error downloading image {source:?} for post {post}: {error}"
                );
                return None;
            }
        };

        match self.store.sideload(&temp, &name.basename, post).await {
            Ok(media) => {
                info!(%post, %media, source, "uploaded image");
                Some(media)
            }
            Err(error) => {
                remove_temp(&temp).await;
                log_error!(
                    self.errors,
                    Label::PostImage,
                    "Error uploading image {source:?} to post {post}: {error}"
                );
                None
            }
        }
    }
}
