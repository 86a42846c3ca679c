//! MuPDF document backend
//!
//! `mupdf::Document` cannot leave the thread that opened it, so the document
//! lives on a dedicated render thread and every backend call is a request
//! over a flume channel with its own reply channel.

use std::path::Path;
use std::thread::JoinHandle;

use flume::Sender;
use log::{debug, error, warn};
use mupdf::{Colorspace, Document, Matrix};

use super::backend::DocumentBackend;
use super::error::BackendError;
use super::types::{
    Action, Destination, LinkMapping, LinkRect, NamedAction, OutlineLabel, Pixmap, stride,
};

type Reply<T> = Sender<Result<T, BackendError>>;

enum BackendRequest {
    NaturalSize { page: usize, reply: Reply<(f64, f64)> },
    Render { page: usize, scale: f64, reply: Reply<Pixmap> },
    Links { page: usize, reply: Reply<Vec<LinkMapping>> },
    NamedDest { name: String, reply: Sender<Option<Destination>> },
    Outline { reply: Sender<Vec<OutlineLabel>> },
    Shutdown,
}

pub struct MupdfBackend {
    requests: Sender<BackendRequest>,
    thread: Option<JoinHandle<()>>,
    page_count: usize,
}

impl MupdfBackend {
    /// Open `path` on a new render thread.
    pub fn open(path: &Path) -> Result<Self, BackendError> {
        let (requests, request_rx) = flume::unbounded();
        let (opened_tx, opened_rx) = flume::bounded(1);
        let doc_path = path.to_path_buf();

        let thread = std::thread::Builder::new()
            .name("pdf-render".to_string())
            .spawn(move || {
                let doc = match open_document(&doc_path) {
                    Ok((doc, page_count)) => {
                        let _ = opened_tx.send(Ok(page_count));
                        doc
                    }
                    Err(e) => {
                        let _ = opened_tx.send(Err(e));
                        return;
                    }
                };

                for request in request_rx {
                    if !handle_request(&doc, request) {
                        break;
                    }
                }
                debug!("Render thread for {doc_path:?} exiting");
            })
            .map_err(|e| BackendError::generic(format!("cannot spawn render thread: {e}")))?;

        let page_count = opened_rx
            .recv()
            .map_err(|_| BackendError::Disconnected)??;

        Ok(Self {
            requests,
            thread: Some(thread),
            page_count,
        })
    }

    fn call<T>(
        &self,
        request: impl FnOnce(Sender<T>) -> BackendRequest,
    ) -> Result<T, BackendError> {
        let (reply, response) = flume::bounded(1);
        self.requests
            .send(request(reply))
            .map_err(|_| BackendError::Disconnected)?;
        response.recv().map_err(|_| BackendError::Disconnected)
    }
}

impl DocumentBackend for MupdfBackend {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page_natural_size(&self, index: usize) -> Result<(f64, f64), BackendError> {
        self.call(|reply| BackendRequest::NaturalSize { page: index, reply })?
    }

    fn render(&self, index: usize, scale: f64) -> Result<Pixmap, BackendError> {
        self.call(|reply| BackendRequest::Render {
            page: index,
            scale,
            reply,
        })?
    }

    fn link_mapping(&self, index: usize) -> Result<Vec<LinkMapping>, BackendError> {
        self.call(|reply| BackendRequest::Links { page: index, reply })?
    }

    fn find_named_destination(&self, name: &str) -> Option<Destination> {
        let name = name.to_string();
        self.call(|reply| BackendRequest::NamedDest { name, reply })
            .unwrap_or_else(|e| {
                warn!("Named destination lookup failed: {e}");
                None
            })
    }

    fn outline_labels(&self) -> Vec<OutlineLabel> {
        self.call(|reply| BackendRequest::Outline { reply })
            .unwrap_or_else(|e| {
                warn!("Outline lookup failed: {e}");
                Vec::new()
            })
    }
}

impl Drop for MupdfBackend {
    fn drop(&mut self) {
        let _ = self.requests.send(BackendRequest::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Render thread panicked");
            }
        }
    }
}

fn open_document(path: &Path) -> Result<(Document, usize), BackendError> {
    let open_error = |detail: String| BackendError::Open {
        path: path.to_path_buf(),
        detail,
    };

    let doc = Document::open(path.to_string_lossy().as_ref())
        .map_err(|e| open_error(e.to_string()))?;
    let page_count = doc.page_count().map_err(|e| open_error(e.to_string()))?;
    let page_count = usize::try_from(page_count).unwrap_or(0);
    if page_count == 0 {
        return Err(open_error("document has no pages".to_string()));
    }
    Ok((doc, page_count))
}

/// Serve one request. Returns `false` on shutdown.
fn handle_request(doc: &Document, request: BackendRequest) -> bool {
    match request {
        BackendRequest::NaturalSize { page, reply } => {
            let _ = reply.send(natural_size(doc, page));
        }
        BackendRequest::Render { page, scale, reply } => {
            let _ = reply.send(render_page(doc, page, scale));
        }
        BackendRequest::Links { page, reply } => {
            let _ = reply.send(link_mapping(doc, page));
        }
        BackendRequest::NamedDest { name, reply } => {
            let _ = reply.send(find_named_destination(doc, &name));
        }
        BackendRequest::Outline { reply } => {
            let _ = reply.send(outline_labels(doc));
        }
        BackendRequest::Shutdown => return false,
    }
    true
}

fn load_page(doc: &Document, index: usize) -> Result<mupdf::Page, BackendError> {
    let page_num = i32::try_from(index).map_err(|_| BackendError::NoSuchPage(index))?;
    Ok(doc.load_page(page_num)?)
}

fn natural_size(doc: &Document, index: usize) -> Result<(f64, f64), BackendError> {
    let bounds = load_page(doc, index)?.bounds()?;
    Ok((
        f64::from(bounds.x1 - bounds.x0),
        f64::from(bounds.y1 - bounds.y0),
    ))
}

fn render_page(doc: &Document, index: usize, scale: f64) -> Result<Pixmap, BackendError> {
    let page = load_page(doc, index)?;
    let matrix = Matrix::new_scale(scale as f32, scale as f32);
    let pixmap = page.to_pixmap(&matrix, &Colorspace::device_rgb(), false, false)?;
    pixmap_to_rgba(&pixmap)
}

/// Repack an RGB(A) engine pixmap into a tightly packed, opaque RGBA raster.
fn pixmap_to_rgba(pixmap: &mupdf::Pixmap) -> Result<Pixmap, BackendError> {
    let n = pixmap.n() as usize;
    if n < 3 {
        return Err(BackendError::generic(format!(
            "Unsupported pixmap format: {n} channels"
        )));
    }

    let width = pixmap.width() as u32;
    let height = pixmap.height() as u32;
    let src_stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    let row_bytes = width as usize * n;
    if samples.len() < src_stride.saturating_mul(height as usize) || row_bytes > src_stride {
        return Err(BackendError::generic("Pixmap buffer size mismatch"));
    }

    let mut out = Vec::with_capacity(height as usize * stride(width));
    for y in 0..height as usize {
        let row_start = y * src_stride;
        for px in samples[row_start..row_start + row_bytes].chunks_exact(n) {
            out.extend_from_slice(&[px[0], px[1], px[2], 0xFF]);
        }
    }

    Pixmap::from_raw(width, height, out)
        .ok_or_else(|| BackendError::generic("Pixmap buffer size mismatch"))
}

fn link_mapping(doc: &Document, index: usize) -> Result<Vec<LinkMapping>, BackendError> {
    let page = load_page(doc, index)?;
    let links = page.links()?;

    Ok(links
        .filter_map(|link| {
            let action = if let Some(dest) = link.dest {
                Action::GotoDest(Destination {
                    page_num: dest.loc.page_number as usize + 1,
                })
            } else {
                uri_action(&link.uri)?
            };

            let rect = link.bounds;
            Some(LinkMapping {
                area: LinkRect::new(
                    f64::from(rect.x0),
                    f64::from(rect.y0),
                    f64::from(rect.x1),
                    f64::from(rect.y1),
                ),
                action,
            })
        })
        .collect())
}

/// Classify a link the engine could not resolve to a page.
fn uri_action(uri: &str) -> Option<Action> {
    if uri.is_empty() {
        return None;
    }
    if let Some(name) = uri.strip_prefix("#nameddest=") {
        return Some(Action::GotoNamed(name.to_string()));
    }
    if let Some(name) = uri.strip_prefix("#action=") {
        return Some(Action::Named(NamedAction::from_name(name)));
    }
    if let Some(name) = uri.strip_prefix('#') {
        return Some(Action::GotoNamed(name.to_string()));
    }
    Some(Action::Uri(uri.to_string()))
}

/// Look a name up among the resolved links of the document.
fn find_named_destination(doc: &Document, name: &str) -> Option<Destination> {
    let wanted = [format!("#nameddest={name}"), format!("#{name}")];
    let page_count = doc.page_count().ok()?;

    for page_num in 0..page_count {
        let Ok(page) = doc.load_page(page_num) else {
            continue;
        };
        let Ok(links) = page.links() else {
            continue;
        };
        for link in links {
            if let Some(dest) = link.dest {
                if wanted.iter().any(|w| *w == link.uri) {
                    return Some(Destination {
                        page_num: dest.loc.page_number as usize + 1,
                    });
                }
            }
        }
    }
    None
}

fn outline_labels(doc: &Document) -> Vec<OutlineLabel> {
    let mut labels = Vec::new();
    match doc.outlines() {
        Ok(outlines) => flatten_outlines(&outlines, &mut labels),
        Err(e) => debug!("Document has no outline: {e}"),
    }
    labels
}

fn flatten_outlines(outlines: &[mupdf::Outline], labels: &mut Vec<OutlineLabel>) {
    for outline in outlines {
        if let Some(dest) = outline.dest {
            let title = outline.title.trim();
            if !title.is_empty() {
                labels.push(OutlineLabel {
                    label: title.to_string(),
                    first_page: dest.loc.page_number as usize,
                });
            }
        }

        if !outline.down.is_empty() {
            flatten_outlines(&outline.down, labels);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_uris_are_classified() {
        assert_eq!(
            uri_action("#nameddest=intro"),
            Some(Action::GotoNamed("intro".to_string()))
        );
        assert_eq!(
            uri_action("#action=NextPage"),
            Some(Action::Named(NamedAction::NextPage))
        );
        assert_eq!(
            uri_action("https://example.org"),
            Some(Action::Uri("https://example.org".to_string()))
        );
        assert_eq!(uri_action(""), None);
    }

    #[test]
    fn opening_missing_file_fails() {
        let err = MupdfBackend::open(Path::new("/nonexistent/talk.pdf")).err();
        assert!(matches!(err, Some(BackendError::Open { .. })));
    }
}
