//! Serving a directory tree of files.
//!
//! A [Directory] turns into a [Declaration] that captures the remaining request path and
//! answers `GET`/`HEAD` with the file it resolves to. File access goes through a
//! [FileProvider], so hosts can substitute their own storage.
use super::{
    declaration::Declaration,
    handler::Input,
    path::UrlPath,
    query::QueryMatcher,
    reply::{BodySource, Reply, ResponseContent},
};
use bytes::{Bytes, BytesMut};
use futures::{
    future::{self, BoxFuture, FutureExt},
    stream::{self, BoxStream, StreamExt},
};
use headers::ContentType;
use http::{Method, StatusCode};
use std::{
    convert::Infallible,
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};
use tokio::{fs, io::AsyncReadExt};
use tracing::debug;

const READ_CHUNK: usize = 64 * 1024;

/// Path prefixes a directory refuses or explicitly allows.
///
/// Paths with a hidden segment (one starting with `.`) are refused unless the white list
/// covers them. A hidden segment may also be passed through on the way to a white listed
/// path, but nowhere else. Black listed prefixes are always refused.
///
/// ```
/// use arbor::directory::AccessList;
///
/// let access = AccessList::default();
/// assert!(access.permits(&"a/b.txt".into()));
/// assert!(access.permits(&".well-known/x".into()));
/// assert!(!access.permits(&"a/.well-known/x".into()));
/// assert!(!access.permits(&".git/config".into()));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessList {
    black: Vec<UrlPath>,
    white: Vec<UrlPath>,
}

impl Default for AccessList {
    fn default() -> Self {
        Self {
            black: Vec::new(),
            white: vec![UrlPath::from_segments([".well-known"])],
        }
    }
}

impl AccessList {
    /// An access list with the given black and white lists. The white list replaces the
    /// default one.
    pub fn new<B, W>(black: B, white: W) -> Self
    where
        B: IntoIterator,
        B::Item: Into<UrlPath>,
        W: IntoIterator,
        W::Item: Into<UrlPath>,
    {
        Self {
            black: black.into_iter().map(Into::into).collect(),
            white: white.into_iter().map(Into::into).collect(),
        }
    }

    /// Refuse `path` and everything below it.
    pub fn deny<P: Into<UrlPath>>(&mut self, path: P) {
        self.black.push(path.into());
    }

    pub fn permits(&self, path: &UrlPath) -> bool {
        let segments = path.segments();
        let mut restricted = false;

        for i in 1..=segments.len() {
            let prefix = &segments[..i];

            if (self.black.iter()).any(|b| prefix.starts_with(b.segments())) {
                return false;
            }
            if (self.white.iter()).any(|w| prefix.starts_with(w.segments())) {
                // the rest of the path is white listed, black list permitting
                return !(self.black.iter()).any(|b| segments.starts_with(b.segments()));
            }

            let leads_to_white = (self.white.iter()).any(|w| w.segments().starts_with(prefix));
            if segments[i - 1].starts_with('.') || restricted {
                if !leads_to_white {
                    return false;
                }
                restricted = true;
            }
        }

        !restricted
    }
}

/// Storage a [Directory] reads files from.
pub trait FileProvider: Send + Sync {
    /// Map a request subpath below `root` to a servable file, or `None`.
    fn resolve<'a>(
        &'a self,
        subpath: &'a UrlPath,
        root: &'a Path,
        access: &'a AccessList,
    ) -> BoxFuture<'a, Option<PathBuf>>;

    /// Returns when `file` was last modified, if known.
    fn last_modified<'a>(&'a self, file: &'a Path) -> BoxFuture<'a, Option<SystemTime>>;

    /// Returns the length of `file` in bytes, if known.
    fn content_length<'a>(&'a self, _file: &'a Path) -> BoxFuture<'a, Option<u64>> {
        future::ready(None).boxed()
    }

    /// Open `file` as a stream of chunks.
    fn open<'a>(
        &'a self,
        file: &'a Path,
    ) -> BoxFuture<'a, io::Result<BoxStream<'static, io::Result<Bytes>>>>;
}

/// A [FileProvider] backed by the local filesystem.
#[derive(Clone, Debug)]
pub struct LocalFiles {
    index_names: Vec<String>,
}

impl Default for LocalFiles {
    fn default() -> Self {
        Self::new(["index.html", "index"])
    }
}

impl LocalFiles {
    /// A provider resolving directories to the first existing file of `index_names`.
    pub fn new<I, S>(index_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let index_names = index_names.into_iter().map(Into::into).collect();
        Self { index_names }
    }

    async fn find(&self, subpath: &UrlPath, root: &Path, access: &AccessList) -> Option<PathBuf> {
        if !access.permits(subpath) {
            debug!(path = %subpath, "refused by access list");
            return None;
        }

        let mut path = root.to_path_buf();
        for segment in subpath.segments() {
            // decoded separators must not introduce new path components
            if segment.contains(&['/', '\\', '\0'][..]) {
                return None;
            }
            path.push(segment);
        }

        let meta = fs::metadata(&path).await.ok()?;
        if meta.is_file() {
            return Some(path);
        }
        if !meta.is_dir() {
            return None;
        }

        for name in &self.index_names {
            let candidate = path.join(name);
            if let Ok(meta) = fs::metadata(&candidate).await {
                if meta.is_file() {
                    return Some(candidate);
                }
            }
        }

        debug!(path = %subpath, "no index file");
        None
    }
}

impl FileProvider for LocalFiles {
    fn resolve<'a>(
        &'a self,
        subpath: &'a UrlPath,
        root: &'a Path,
        access: &'a AccessList,
    ) -> BoxFuture<'a, Option<PathBuf>> {
        self.find(subpath, root, access).boxed()
    }

    fn last_modified<'a>(&'a self, file: &'a Path) -> BoxFuture<'a, Option<SystemTime>> {
        async move { fs::metadata(file).await.ok()?.modified().ok() }.boxed()
    }

    fn content_length<'a>(&'a self, file: &'a Path) -> BoxFuture<'a, Option<u64>> {
        async move { Some(fs::metadata(file).await.ok()?.len()) }.boxed()
    }

    fn open<'a>(
        &'a self,
        file: &'a Path,
    ) -> BoxFuture<'a, io::Result<BoxStream<'static, io::Result<Bytes>>>> {
        async move {
            let file = fs::File::open(file).await?;

            let chunks = stream::try_unfold(file, |mut file| async move {
                let mut buf = BytesMut::with_capacity(READ_CHUNK);
                match file.read_buf(&mut buf).await? {
                    0 => Ok::<_, io::Error>(None),
                    _ => Ok(Some((buf.freeze(), file))),
                }
            });

            Ok(chunks.boxed())
        }
        .boxed()
    }
}

/// Guess a content type from a file extension.
pub fn content_type(path: &Path) -> mime::Mime {
    mime_guess::from_path(path).first_or_octet_stream()
}

type StatusFileName = Arc<dyn Fn(StatusCode) -> Option<String> + Send + Sync>;

/// A directory served below the node it is attached to.
///
/// A request for a file that cannot be served is a routing miss: it is answered by the
/// incident handlers of the deepest node the request path reached.
///
/// ```
/// use arbor::{directory::Directory, tree::RouteNode};
///
/// let _root = RouteNode::new().group(
///     "static",
///     RouteNode::new().respond(
///         Directory::new("./public")
///             .index_names(["index.html"])
///             .black_list(["drafts"])
///             .status_directory("./public/status"),
///     ),
/// );
/// ```
#[derive(Clone)]
pub struct Directory {
    root: PathBuf,
    access: AccessList,
    index_names: Vec<String>,
    provider: Option<Arc<dyn FileProvider>>,
    status_directory: Option<PathBuf>,
    status_file_name: StatusFileName,
}

impl Directory {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            access: AccessList::default(),
            index_names: vec!["index.html".into(), "index".into()],
            provider: None,
            status_directory: None,
            status_file_name: Arc::new(|status| Some(format!("{}.html", status.as_u16()))),
        }
    }

    /// File names tried, in order, when a request resolves to a directory.
    pub fn index_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.index_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Refuse these paths (relative to the root) and everything below them.
    pub fn black_list<I>(mut self, paths: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<UrlPath>,
    {
        self.access.black = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Allow these hidden paths (relative to the root). Replaces the default white list.
    pub fn white_list<I>(mut self, paths: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<UrlPath>,
    {
        self.access.white = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Answer incidents of this directory with pages from `dir`, named by
    /// [status_file_name](Directory::status_file_name). If `dir` lies inside the root, it is
    /// refused for direct access. Incidents without a page go on to enclosing handlers.
    pub fn status_directory<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.status_directory = Some(dir.into());
        self
    }

    /// Name the status page for each status, or `None` for statuses without one. Defaults
    /// to `<code>.html`.
    ///
    /// ```
    /// use arbor::directory::Directory;
    /// use http::StatusCode;
    ///
    /// let _ = Directory::new("./public")
    ///     .status_directory("./errors")
    ///     .status_file_name(|status| match status {
    ///         StatusCode::NOT_FOUND => Some("NotFound.html".to_owned()),
    ///         _ => None,
    ///     });
    /// ```
    pub fn status_file_name<F>(mut self, f: F) -> Self
    where
        F: Fn(StatusCode) -> Option<String> + Send + Sync + 'static,
    {
        self.status_file_name = Arc::new(f);
        self
    }

    /// Read files through `provider` instead of the local filesystem.
    pub fn provider<P: FileProvider + 'static>(mut self, provider: P) -> Self {
        self.provider = Some(Arc::new(provider));
        self
    }

    pub fn into_declaration(self) -> Declaration {
        let Directory {
            root,
            mut access,
            index_names,
            provider,
            status_directory,
            status_file_name,
        } = self;

        let provider = provider.unwrap_or_else(|| Arc::new(LocalFiles::new(index_names)));

        let mut decl = Declaration::new()
            .methods([Method::GET, Method::HEAD])
            .query(QueryMatcher::Any)
            .any_subpath()
            .fall_through();

        if let Some(dir) = status_directory {
            if let Ok(inner) = dir.strip_prefix(&root) {
                let segments = inner.iter().filter_map(|s| s.to_str());
                access.deny(UrlPath::from_segments(segments));
            }

            let provider = provider.clone();
            decl = decl.on_incident(move |incident| {
                let path = dir.join(status_file_name(incident.status())?);
                let body = BodySource::File {
                    provider: provider.clone(),
                    path,
                };
                Some(
                    ResponseContent::with_body(body)
                        .with_header(ContentType::html())
                        .with_status(incident.status()),
                )
            });
        }

        let root = Arc::new(root);
        let access = Arc::new(access);

        decl.handle(move |input: Input| {
            let (provider, root, access) = (provider.clone(), root.clone(), access.clone());

            async move {
                let file = match provider.resolve(input.subpath(), &root, &access).await {
                    Some(file) => file,
                    None => return Ok::<_, Infallible>(None),
                };

                let modified = provider.last_modified(&file).await;
                let len = provider.content_length(&file).await;
                let mime = content_type(&file);
                let body = BodySource::File {
                    provider,
                    path: file,
                };

                let mut content = ResponseContent::with_body(body)
                    .with_header(ContentType::from(mime))
                    .with_status(StatusCode::OK);
                if let Some(t) = modified {
                    content = content.with_modification_date(t);
                }
                if let Some(len) = len {
                    content = content.with_content_length(len);
                }
                Ok(Some(content))
            }
        })
    }
}

impl From<Directory> for Declaration {
    #[inline]
    fn from(d: Directory) -> Self {
        d.into_declaration()
    }
}
