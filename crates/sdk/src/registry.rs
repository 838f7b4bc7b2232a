//! Service lookup and the client cache.
//!
//! A [`SchemaCatalog`] maps schema files (paths relative to the schema root)
//! to the services they declare. Each service is a static
//! [`ServiceDescriptor`] listing its methods, so a method name is checked
//! before anything goes on the wire.
//!
//! The [`ServiceRegistry`] resolves `(file, dotted path)` against the catalog
//! and caches one [`ServiceClient`] per pair:
//!
//! ```text
//! service("com/daml/ledger/api/v2/state_service.proto",
//!         "com.daml.ledger.api.v2.StateService")
//!    │
//!    ├─ cache hit ───────────────────────────────▶ Arc<ServiceClient>
//!    │
//!    └─ miss: file ─▶ package segments ─▶ service ─▶ build, insert, return
//! ```

use std::{collections::HashMap, fmt, path::Path, sync::Arc};

use parking_lot::RwLock;
use tonic::{
    client::Grpc,
    codec::CompressionEncoding,
    codegen::{InterceptedService, http::uri::PathAndQuery},
    transport::Channel,
};

use crate::{
    auth::{AuthInterceptor, TokenStore},
    connection::ConnectionPool,
    error::{Result, SchemaNotFoundSnafu, ServiceNotFoundSnafu, UnknownMethodSnafu},
};

/// Ledger API v2 protobuf package.
pub const LEDGER_API_V2_PACKAGE: &str = "com.daml.ledger.api.v2";

/// How a method exchanges messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// One request, one response.
    Unary,
    /// One request, a stream of responses.
    ServerStreaming,
}

/// A method exposed by a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodDescriptor {
    /// Method name as declared in the schema (e.g. `GetLedgerEnd`).
    pub name: &'static str,
    /// gRPC path, `/{package}.{Service}/{Method}`.
    pub path: &'static str,
    /// Message exchange pattern.
    pub kind: MethodKind,
}

/// A service declared in a schema file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// Protobuf package.
    pub package: &'static str,
    /// Simple service name.
    pub name: &'static str,
    /// Fully-qualified service name.
    pub full_name: &'static str,
    /// Methods the service exposes.
    pub methods: &'static [MethodDescriptor],
}

impl ServiceDescriptor {
    /// Looks up a method by name.
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&'static MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }
}

macro_rules! ledger_service {
    ($ident:ident, $name:literal, [$(($method:literal, $kind:ident)),+ $(,)?]) => {
        /// Descriptor of the
        #[doc = concat!("`", $name, "`")]
        /// service.
        pub static $ident: ServiceDescriptor = ServiceDescriptor {
            package: LEDGER_API_V2_PACKAGE,
            name: $name,
            full_name: concat!("com.daml.ledger.api.v2.", $name),
            methods: &[$(MethodDescriptor {
                name: $method,
                path: concat!("/com.daml.ledger.api.v2.", $name, "/", $method),
                kind: MethodKind::$kind,
            }),+],
        };
    };
}

ledger_service!(VERSION_SERVICE, "VersionService", [("GetLedgerApiVersion", Unary)]);
ledger_service!(COMMAND_SERVICE, "CommandService", [
    ("SubmitAndWait", Unary),
    ("SubmitAndWaitForTransaction", Unary),
    ("SubmitAndWaitForTransactionTree", Unary),
]);
ledger_service!(COMMAND_SUBMISSION_SERVICE, "CommandSubmissionService", [("Submit", Unary)]);
ledger_service!(COMMAND_COMPLETION_SERVICE, "CommandCompletionService", [(
    "CompletionStream",
    ServerStreaming
)]);
ledger_service!(STATE_SERVICE, "StateService", [
    ("GetActiveContracts", ServerStreaming),
    ("GetLedgerEnd", Unary),
]);

/// Schema files of the Ledger API v2 and the services each declares.
pub mod schema {
    /// Version service schema file.
    pub const VERSION_SERVICE: &str = "com/daml/ledger/api/v2/version_service.proto";
    /// Command service schema file.
    pub const COMMAND_SERVICE: &str = "com/daml/ledger/api/v2/command_service.proto";
    /// Command submission service schema file.
    pub const COMMAND_SUBMISSION_SERVICE: &str =
        "com/daml/ledger/api/v2/command_submission_service.proto";
    /// Command completion service schema file.
    pub const COMMAND_COMPLETION_SERVICE: &str =
        "com/daml/ledger/api/v2/command_completion_service.proto";
    /// State service schema file.
    pub const STATE_SERVICE: &str = "com/daml/ledger/api/v2/state_service.proto";
}

/// Services declared by one schema file, under one package.
#[derive(Debug, Clone)]
struct SchemaFile {
    package: &'static str,
    services: Vec<&'static ServiceDescriptor>,
}

/// Catalog of known schema files.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    files: HashMap<String, SchemaFile>,
}

impl SchemaCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog of the Ledger API v2 services this crate calls.
    #[must_use]
    pub fn ledger_api_v2() -> Self {
        let mut catalog = Self::new();
        catalog.register(schema::VERSION_SERVICE, LEDGER_API_V2_PACKAGE, &[&VERSION_SERVICE]);
        catalog.register(schema::COMMAND_SERVICE, LEDGER_API_V2_PACKAGE, &[&COMMAND_SERVICE]);
        catalog.register(schema::COMMAND_SUBMISSION_SERVICE, LEDGER_API_V2_PACKAGE, &[
            &COMMAND_SUBMISSION_SERVICE,
        ]);
        catalog.register(schema::COMMAND_COMPLETION_SERVICE, LEDGER_API_V2_PACKAGE, &[
            &COMMAND_COMPLETION_SERVICE,
        ]);
        catalog.register(schema::STATE_SERVICE, LEDGER_API_V2_PACKAGE, &[&STATE_SERVICE]);
        catalog
    }

    /// Registers a schema file declaring `services` in `package`.
    ///
    /// Registering the same file again replaces the earlier entry.
    pub fn register(
        &mut self,
        file: impl Into<String>,
        package: &'static str,
        services: &[&'static ServiceDescriptor],
    ) {
        self.files.insert(file.into(), SchemaFile { package, services: services.to_vec() });
    }

    /// Resolves a dotted service path declared in `file`.
    ///
    /// The path is walked one segment at a time: first the package
    /// segments, then the service name.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::SchemaNotFound`](crate::SdkError::SchemaNotFound) if
    /// the file is unknown, or
    /// [`SdkError::ServiceNotFound`](crate::SdkError::ServiceNotFound) naming
    /// the first segment that does not resolve.
    pub fn resolve(&self, file: &str, path: &str) -> Result<&'static ServiceDescriptor> {
        let schema = self.files.get(file).ok_or_else(|| SchemaNotFoundSnafu { file }.build())?;

        let mut segments = path.split('.');
        let missing = |segment: &str| ServiceNotFoundSnafu { path, segment }.build();

        for expected in schema.package.split('.') {
            match segments.next() {
                Some(segment) if segment == expected => {},
                Some(segment) => return Err(missing(segment)),
                // The path names a namespace, not a service
                None => return Err(missing(path.rsplit('.').next().unwrap_or(path))),
            }
        }

        let name = segments.next().ok_or_else(|| missing(path.rsplit('.').next().unwrap_or(path)))?;
        let service = schema
            .services
            .iter()
            .copied()
            .find(|s| s.name == name)
            .ok_or_else(|| missing(name))?;

        match segments.next() {
            // Services have no nested members to walk into
            Some(extra) => Err(missing(extra)),
            None => Ok(service),
        }
    }
}

/// Transport stack every service client shares.
pub(crate) type AuthChannel = InterceptedService<Channel, AuthInterceptor>;

/// A client bound to one service on the shared channel.
///
/// Stateless apart from the channel handle; clones of the inner
/// [`Grpc`] are cheap and share the connection.
#[derive(Clone)]
pub struct ServiceClient {
    descriptor: &'static ServiceDescriptor,
    grpc: Grpc<AuthChannel>,
}

impl fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClient").field("service", &self.descriptor.full_name).finish()
    }
}

impl ServiceClient {
    pub(crate) fn new(
        descriptor: &'static ServiceDescriptor,
        channel: Channel,
        tokens: TokenStore,
        compression: bool,
    ) -> Self {
        let mut grpc = Grpc::new(InterceptedService::new(channel, AuthInterceptor::new(tokens)));
        if compression {
            grpc = grpc
                .send_compressed(CompressionEncoding::Gzip)
                .accept_compressed(CompressionEncoding::Gzip);
        }
        Self { descriptor, grpc }
    }

    /// Returns the service descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &'static ServiceDescriptor {
        self.descriptor
    }

    /// Returns the fully-qualified service name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.descriptor.full_name
    }

    /// Looks up a method, failing without a network call if it is unknown
    /// or has a different exchange pattern.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::UnknownMethod`](crate::SdkError::UnknownMethod).
    pub fn method(&self, name: &str, kind: MethodKind) -> Result<&'static MethodDescriptor> {
        self.descriptor.method(name).filter(|m| m.kind == kind).ok_or_else(|| {
            UnknownMethodSnafu { service: self.descriptor.full_name, method: name }.build()
        })
    }

    /// Sends a unary request.
    pub(crate) async fn unary<Req, Resp>(
        &self,
        method: &'static MethodDescriptor,
        request: tonic::Request<Req>,
    ) -> std::result::Result<tonic::Response<Resp>, tonic::Status>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = self.ready().await?;
        let request = self.tag(method, request);
        grpc.unary(request, PathAndQuery::from_static(method.path), tonic_prost::ProstCodec::default())
            .await
    }

    /// Opens a server stream.
    pub(crate) async fn server_streaming<Req, Resp>(
        &self,
        method: &'static MethodDescriptor,
        request: tonic::Request<Req>,
    ) -> std::result::Result<tonic::Response<tonic::Streaming<Resp>>, tonic::Status>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = self.ready().await?;
        let request = self.tag(method, request);
        grpc.server_streaming(
            request,
            PathAndQuery::from_static(method.path),
            tonic_prost::ProstCodec::default(),
        )
        .await
    }

    async fn ready(&self) -> std::result::Result<Grpc<AuthChannel>, tonic::Status> {
        let mut grpc = self.grpc.clone();
        grpc.ready()
            .await
            .map_err(|e| tonic::Status::unknown(format!("Service was not ready: {e}")))?;
        Ok(grpc)
    }

    fn tag<T>(
        &self,
        method: &'static MethodDescriptor,
        mut request: tonic::Request<T>,
    ) -> tonic::Request<T> {
        request
            .extensions_mut()
            .insert(tonic::GrpcMethod::new(self.descriptor.full_name, method.name));
        request
    }
}

/// Cache key: schema file plus dotted service path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ServiceKey {
    file: String,
    path: String,
}

/// Resolves services and caches one client per `(file, path)`.
#[derive(Debug)]
pub struct ServiceRegistry {
    catalog: SchemaCatalog,
    pool: ConnectionPool,
    tokens: TokenStore,
    clients: RwLock<HashMap<ServiceKey, Arc<ServiceClient>>>,
}

impl ServiceRegistry {
    /// Creates an empty registry over `catalog`.
    #[must_use]
    pub fn new(catalog: SchemaCatalog, pool: ConnectionPool, tokens: TokenStore) -> Self {
        Self { catalog, pool, tokens, clients: RwLock::new(HashMap::new()) }
    }

    /// Returns the client for `path` declared in `file`, building it once.
    ///
    /// `file` is relative to the schema root; a path that still carries the
    /// root as prefix is accepted too.
    ///
    /// # Errors
    ///
    /// Returns a construction error if the file or service is unknown or the
    /// channel cannot be built.
    pub fn service(&self, file: &str, path: &str) -> Result<Arc<ServiceClient>> {
        let file = self.relative_to_root(file);
        let key = ServiceKey { file: file.to_owned(), path: path.to_owned() };

        // Fast path: check if client already exists
        if let Some(client) = self.clients.read().get(&key) {
            tracing::trace!(file, path, "Service client cache hit");
            return Ok(Arc::clone(client));
        }

        let descriptor = self.catalog.resolve(file, path)?;

        let mut clients = self.clients.write();
        // Double-check pattern: a concurrent caller may have inserted it
        if let Some(client) = clients.get(&key) {
            return Ok(Arc::clone(client));
        }
        let client = Arc::new(ServiceClient::new(
            descriptor,
            self.pool.channel()?,
            self.tokens.clone(),
            self.pool.compression_enabled(),
        ));
        clients.insert(key, Arc::clone(&client));
        tracing::debug!(file, path, service = descriptor.full_name, "Constructed service client");
        Ok(client)
    }

    /// Number of cached clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    /// Returns true if no client is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }

    /// Drops every cached client and the shared channel.
    ///
    /// The channel is released under the client cache lock, so a concurrent
    /// lookup cannot cache a client built on the released channel.
    ///
    /// Returns the number of clients released.
    pub fn clear(&self) -> usize {
        let mut clients = self.clients.write();
        let released = clients.len();
        clients.clear();
        self.pool.reset();
        released
    }

    fn relative_to_root<'a>(&self, file: &'a str) -> &'a str {
        Path::new(file)
            .strip_prefix(self.pool.config().schema_root())
            .ok()
            .and_then(Path::to_str)
            .unwrap_or(file)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::{ClientConfig, SdkError};

    fn registry() -> ServiceRegistry {
        let config = ClientConfig::builder().with_endpoint("localhost:6865").build().unwrap();
        ServiceRegistry::new(
            SchemaCatalog::ledger_api_v2(),
            ConnectionPool::new(config),
            TokenStore::default(),
        )
    }

    #[test]
    fn method_paths_are_fully_qualified() {
        let method = STATE_SERVICE.method("GetLedgerEnd").unwrap();
        assert_eq!(method.path, "/com.daml.ledger.api.v2.StateService/GetLedgerEnd");
        assert_eq!(method.kind, MethodKind::Unary);
        assert_eq!(STATE_SERVICE.full_name, "com.daml.ledger.api.v2.StateService");
        assert!(STATE_SERVICE.method("Nope").is_none());
    }

    #[test]
    fn catalog_resolves_known_service() {
        let catalog = SchemaCatalog::ledger_api_v2();
        let service =
            catalog.resolve(schema::COMMAND_SERVICE, "com.daml.ledger.api.v2.CommandService").unwrap();
        assert_eq!(service, &COMMAND_SERVICE);
    }

    #[test]
    fn catalog_matches_compiled_schemas() {
        use prost::Message;

        let compiled =
            prost_types::FileDescriptorSet::decode(daml_ledger_proto::FILE_DESCRIPTOR_SET).unwrap();
        let catalog = SchemaCatalog::ledger_api_v2();
        assert_eq!(catalog.files.len(), 5);

        for (name, file) in &catalog.files {
            let schema = compiled.file.iter().find(|f| f.name() == name).unwrap();
            assert_eq!(schema.package(), file.package, "{name}");
            for service in &file.services {
                let declared = schema.service.iter().find(|s| s.name() == service.name).unwrap();
                let mut expected: Vec<_> = declared
                    .method
                    .iter()
                    .map(|m| {
                        let kind = if m.server_streaming() {
                            MethodKind::ServerStreaming
                        } else {
                            MethodKind::Unary
                        };
                        (m.name().to_owned(), kind)
                    })
                    .collect();
                let mut known: Vec<_> =
                    service.methods.iter().map(|m| (m.name.to_owned(), m.kind)).collect();
                expected.sort_by(|a, b| a.0.cmp(&b.0));
                known.sort_by(|a, b| a.0.cmp(&b.0));
                assert_eq!(known, expected, "{}", service.full_name);
            }
        }
    }

    #[test]
    fn catalog_reports_missing_file() {
        let catalog = SchemaCatalog::ledger_api_v2();
        let err = catalog.resolve("a/b.schema", "pkg.Svc").unwrap_err();
        assert!(matches!(err, SdkError::SchemaNotFound { ref file } if file == "a/b.schema"));
    }

    #[test]
    fn catalog_reports_first_missing_segment() {
        let catalog = SchemaCatalog::ledger_api_v2();
        let cases = [
            ("com.daml.ledger.api.v3.StateService", "v3"),
            ("com.daml.ledger.api.v2.UpdateService", "UpdateService"),
            ("com.daml.ledger.api.v2.StateService.Inner", "Inner"),
            ("org.daml.ledger.api.v2.StateService", "org"),
            ("com.daml.ledger", "ledger"),
        ];
        for (path, segment) in cases {
            match catalog.resolve(schema::STATE_SERVICE, path) {
                Err(SdkError::ServiceNotFound { segment: got, .. }) => {
                    assert_eq!(got, segment, "path {path}");
                },
                other => panic!("path {path}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn service_in_wrong_file_is_not_found() {
        let catalog = SchemaCatalog::ledger_api_v2();
        let err = catalog
            .resolve(schema::VERSION_SERVICE, "com.daml.ledger.api.v2.StateService")
            .unwrap_err();
        assert!(matches!(err, SdkError::ServiceNotFound { .. }));
    }

    #[test]
    fn custom_registration() {
        let mut catalog = SchemaCatalog::new();
        catalog.register("a/b.schema", LEDGER_API_V2_PACKAGE, &[&VERSION_SERVICE]);
        assert!(catalog.resolve("a/b.schema", "com.daml.ledger.api.v2.VersionService").is_ok());
    }

    #[tokio::test]
    async fn repeated_lookups_share_one_client() {
        let registry = registry();
        let path = "com.daml.ledger.api.v2.StateService";

        let first = registry.service(schema::STATE_SERVICE, path).unwrap();
        let second = registry.service(schema::STATE_SERVICE, path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let other = registry
            .service(schema::COMMAND_SERVICE, "com.daml.ledger.api.v2.CommandService")
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn root_prefixed_file_hits_the_same_entry() {
        let registry = registry();
        let path = "com.daml.ledger.api.v2.VersionService";
        let relative = registry.service(schema::VERSION_SERVICE, path).unwrap();
        let prefixed = registry
            .service("protos/com/daml/ledger/api/v2/version_service.proto", path)
            .unwrap();
        assert!(Arc::ptr_eq(&relative, &prefixed));
    }

    #[tokio::test]
    async fn failed_lookup_caches_nothing() {
        let registry = registry();
        assert!(registry.service(schema::STATE_SERVICE, "com.daml.Missing").is_err());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn clear_releases_clients() {
        let registry = registry();
        let path = "com.daml.ledger.api.v2.StateService";
        let before = registry.service(schema::STATE_SERVICE, path).unwrap();
        assert_eq!(registry.clear(), 1);
        assert!(registry.is_empty());

        let after = registry.service(schema::STATE_SERVICE, path).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn cached_clients_never_outlive_the_channel() {
        let registry = Arc::new(registry());
        let path = "com.daml.ledger.api.v2.StateService";

        let lookups: Vec<_> = (0..3)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    for _ in 0..500 {
                        registry.service(schema::STATE_SERVICE, path).unwrap();
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        let clearer = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                for _ in 0..500 {
                    registry.clear();
                    {
                        // Lookups build under the cache lock, so the cache and
                        // the channel change together.
                        let clients = registry.clients.read();
                        assert!(clients.is_empty() || registry.pool.has_channel());
                    }
                    tokio::task::yield_now().await;
                }
            })
        };
        for task in lookups {
            task.await.unwrap();
        }
        clearer.await.unwrap();

        let clients = registry.clients.read();
        assert!(clients.is_empty() || registry.pool.has_channel());
    }

    #[tokio::test]
    async fn clear_drops_the_channel_with_the_clients() {
        let registry = registry();
        registry.service(schema::STATE_SERVICE, "com.daml.ledger.api.v2.StateService").unwrap();
        assert!(registry.pool.has_channel());

        registry.clear();
        assert!(registry.is_empty());
        assert!(!registry.pool.has_channel());
    }

    #[tokio::test]
    async fn unknown_method_is_rejected_locally() {
        let registry = registry();
        let client =
            registry.service(schema::STATE_SERVICE, "com.daml.ledger.api.v2.StateService").unwrap();
        let err = client.method("DropLedger", MethodKind::Unary).unwrap_err();
        assert!(matches!(err, SdkError::UnknownMethod { ref method, .. } if method == "DropLedger"));

        // Right name, wrong exchange pattern
        assert!(client.method("GetActiveContracts", MethodKind::Unary).is_err());
        assert!(client.method("GetActiveContracts", MethodKind::ServerStreaming).is_ok());
    }
}
