//! Flight SQL over the fixture database.

use std::pin::Pin;
use std::sync::Arc;

use arrow::array::{RecordBatch, StringArray};
use arrow_flight::{
    encode::FlightDataEncoderBuilder,
    error::FlightError,
    flight_service_server::FlightService,
    sql::{
        server::FlightSqlService, CommandGetCatalogs, CommandGetDbSchemas, CommandGetTableTypes,
        CommandGetTables, CommandStatementQuery, ProstMessageExt, SqlInfo, TicketStatementQuery,
    },
    FlightDescriptor, FlightEndpoint, FlightInfo, HandshakeRequest, HandshakeResponse, Ticket,
};
use arrow_schema::{ArrowError, DataType, Field, Schema, SchemaRef};
use base64::{prelude::BASE64_STANDARD, Engine};
use dashmap::DashMap;
use datafusion::prelude::SessionContext;
use futures::{stream, Stream, TryStreamExt};
use prost::Message;
use tonic::metadata::{KeyAndValueRef, MetadataMap};
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ServerError;
use crate::fixtures::{self, table_type_name, TABLE_TYPES};

type HandshakeStream = Pin<Box<dyn Stream<Item = Result<HandshakeResponse, Status>> + Send>>;
type DoGetStream = <FixtureService as FlightService>::DoGetStream;

// transport headers that are not worth recording
const IGNORED_HEADERS: [&str; 4] = ["authorization", "content-type", "te", "user-agent"];

#[derive(Clone)]
pub struct FixtureService {
    ctx: Arc<SessionContext>,
    credentials: Option<(String, String)>,
    authenticate: bool,
    // bearer token -> user
    tokens: Arc<DashMap<String, String>>,
    headers: Arc<DashMap<String, String>>,
}

impl FixtureService {
    /// A service that accepts every client
    pub async fn new() -> crate::error::Result<Self> {
        let ctx = fixtures::new_context()
            .await
            .map_err(|e| ServerError::Fixtures(e.to_string()))?;

        Ok(Self {
            ctx: Arc::new(ctx),
            credentials: None,
            authenticate: false,
            tokens: Arc::new(DashMap::new()),
            headers: Arc::new(DashMap::new()),
        })
    }

    /// Require a basic-auth handshake with these credentials
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((user.into(), password.into()));
        self.authenticate = true;
        self
    }

    /// Accept a bearer token without a handshake
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), String::new());
        self.authenticate = true;
        self
    }

    pub fn context(&self) -> Arc<SessionContext> {
        self.ctx.clone()
    }

    /// Last value received for a call header
    pub fn received_header(&self, key: &str) -> Option<String> {
        self.headers.get(key).map(|value| value.clone())
    }

    fn record_headers(&self, metadata: &MetadataMap) {
        for entry in metadata.iter() {
            if let KeyAndValueRef::Ascii(key, value) = entry {
                let key = key.as_str();
                if IGNORED_HEADERS.contains(&key) || key.starts_with("grpc-") {
                    continue;
                }
                if let Ok(value) = value.to_str() {
                    self.headers.insert(key.to_string(), value.to_string());
                }
            }
        }
    }

    /// A new bearer token for `user`. It replaces the user's previous token,
    /// so the map holds at most one handshake token per user.
    fn issue_token(&self, user: &str) -> String {
        self.tokens.retain(|_, owner| owner != user);

        let token = Uuid::new_v4().to_string();
        self.tokens.insert(token.clone(), user.to_string());
        token
    }

    fn check_request<T>(&self, request: &Request<T>) -> Result<(), Status> {
        self.record_headers(request.metadata());

        if !self.authenticate {
            return Ok(());
        }

        let token = request
            .metadata()
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| Status::unauthenticated("Missing bearer token"))?;

        if self.tokens.contains_key(token) {
            Ok(())
        } else {
            Err(Status::unauthenticated("Invalid bearer token"))
        }
    }

    fn catalog_names(&self) -> Vec<String> {
        let mut names = self.ctx.catalog_names();
        names.sort();
        names
    }

    fn catalogs_batch(&self, query: CommandGetCatalogs) -> Result<RecordBatch, Status> {
        let mut builder = query.into_builder();
        for catalog in self.catalog_names() {
            builder.append(catalog);
        }

        builder.build().map_err(to_flight_err)
    }

    fn schemas_batch(&self, query: CommandGetDbSchemas) -> Result<RecordBatch, Status> {
        let mut builder = query.into_builder();
        for catalog_name in self.catalog_names() {
            let Some(catalog) = self.ctx.catalog(&catalog_name) else {
                continue;
            };
            for schema_name in catalog.schema_names() {
                builder.append(&catalog_name, schema_name);
            }
        }

        builder.build().map_err(to_flight_err)
    }

    async fn tables_batch(&self, query: CommandGetTables) -> Result<RecordBatch, Status> {
        let mut builder = query.into_builder();

        for catalog_name in self.catalog_names() {
            let Some(catalog) = self.ctx.catalog(&catalog_name) else {
                continue;
            };
            for schema_name in catalog.schema_names() {
                let Some(schema) = catalog.schema(&schema_name) else {
                    continue;
                };
                for table_name in schema.table_names() {
                    let Some(table) = schema.table(&table_name).await.map_err(to_tonic_err)? else {
                        continue;
                    };
                    builder
                        .append(
                            &catalog_name,
                            &schema_name,
                            &table_name,
                            table_type_name(table.table_type()),
                            &table.schema(),
                        )
                        .map_err(to_flight_err)?;
                }
            }
        }

        builder.build().map_err(to_flight_err)
    }

    fn table_types_batch(&self) -> Result<RecordBatch, Status> {
        let schema = Arc::new(Schema::new(vec![Field::new(
            "table_type",
            DataType::Utf8,
            false,
        )]));

        RecordBatch::try_new(schema, vec![Arc::new(StringArray::from(TABLE_TYPES.to_vec()))])
            .map_err(to_arrow_err)
    }
}

#[tonic::async_trait]
impl FlightSqlService for FixtureService {
    type FlightService = FixtureService;

    async fn do_handshake(
        &self,
        request: Request<Streaming<HandshakeRequest>>,
    ) -> Result<Response<HandshakeStream>, Status> {
        self.record_headers(request.metadata());

        let authorization = request
            .metadata()
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Basic "))
            .ok_or_else(|| Status::unauthenticated("Missing basic authorization header"))?;
        let decoded = BASE64_STANDARD
            .decode(authorization)
            .map_err(|e| Status::invalid_argument(format!("Invalid authorization header: {e}")))?;
        let decoded = String::from_utf8(decoded)
            .map_err(|e| Status::invalid_argument(format!("Invalid authorization header: {e}")))?;
        let (user, password) = decoded
            .split_once(':')
            .ok_or_else(|| Status::invalid_argument("Invalid authorization header"))?;

        if let Some((expected_user, expected_password)) = &self.credentials {
            if user != expected_user || password != expected_password {
                info!(user, "rejected handshake");
                return Err(Status::unauthenticated("Invalid credentials"));
            }
        }

        let token = self.issue_token(user);
        info!(user, "handshake complete");

        let result = HandshakeResponse {
            protocol_version: 0,
            payload: token.clone().into(),
        };
        let output: HandshakeStream = Box::pin(stream::iter(vec![Ok(result)]));
        let mut response = Response::new(output);
        let bearer = format!("Bearer {token}")
            .parse()
            .map_err(|_| Status::internal("Invalid bearer token"))?;
        response.metadata_mut().insert("authorization", bearer);

        Ok(response)
    }

    async fn get_flight_info_statement(
        &self,
        query: CommandStatementQuery,
        request: Request<FlightDescriptor>,
    ) -> Result<Response<FlightInfo>, Status> {
        self.check_request(&request)?;
        info!(sql = %query.query, "planning statement");

        let df = self.ctx.sql(&query.query).await.map_err(to_tonic_err)?;
        let schema: Schema = df.schema().clone().into();

        let ticket = TicketStatementQuery {
            statement_handle: query.query.into_bytes().into(),
        };
        let info = flight_info(&schema, ticket.as_any().encode_to_vec(), request.into_inner())?;

        Ok(Response::new(info))
    }

    async fn do_get_statement(
        &self,
        ticket: TicketStatementQuery,
        request: Request<Ticket>,
    ) -> Result<Response<DoGetStream>, Status> {
        self.check_request(&request)?;

        let sql = std::str::from_utf8(&ticket.statement_handle)
            .map_err(|e| Status::invalid_argument(format!("Invalid ticket: {e}")))?;
        debug!(sql, "executing statement");

        let df = self.ctx.sql(sql).await.map_err(to_tonic_err)?;
        let schema: SchemaRef = Arc::new(df.schema().clone().into());

        // partitions are streamed in order so UNION ALL keeps its branch order
        let batches: Vec<RecordBatch> = df
            .collect_partitioned()
            .await
            .map_err(to_tonic_err)?
            .into_iter()
            .flatten()
            .collect();
        let schema = batches.first().map(RecordBatch::schema).unwrap_or(schema);

        Ok(Response::new(encode(schema, batches)))
    }

    async fn get_flight_info_catalogs(
        &self,
        query: CommandGetCatalogs,
        request: Request<FlightDescriptor>,
    ) -> Result<Response<FlightInfo>, Status> {
        self.check_request(&request)?;
        let batch = self.catalogs_batch(query.clone())?;
        let info = flight_info(
            &batch.schema(),
            query.as_any().encode_to_vec(),
            request.into_inner(),
        )?;

        Ok(Response::new(info))
    }

    async fn do_get_catalogs(
        &self,
        query: CommandGetCatalogs,
        request: Request<Ticket>,
    ) -> Result<Response<DoGetStream>, Status> {
        self.check_request(&request)?;
        debug!("listing catalogs");
        let batch = self.catalogs_batch(query)?;

        Ok(Response::new(encode(batch.schema(), vec![batch])))
    }

    async fn get_flight_info_schemas(
        &self,
        query: CommandGetDbSchemas,
        request: Request<FlightDescriptor>,
    ) -> Result<Response<FlightInfo>, Status> {
        self.check_request(&request)?;
        let batch = self.schemas_batch(query.clone())?;
        let info = flight_info(
            &batch.schema(),
            query.as_any().encode_to_vec(),
            request.into_inner(),
        )?;

        Ok(Response::new(info))
    }

    async fn do_get_schemas(
        &self,
        query: CommandGetDbSchemas,
        request: Request<Ticket>,
    ) -> Result<Response<DoGetStream>, Status> {
        self.check_request(&request)?;
        debug!(catalog = ?query.catalog, pattern = ?query.db_schema_filter_pattern, "listing schemas");
        let batch = self.schemas_batch(query)?;

        Ok(Response::new(encode(batch.schema(), vec![batch])))
    }

    async fn get_flight_info_tables(
        &self,
        query: CommandGetTables,
        request: Request<FlightDescriptor>,
    ) -> Result<Response<FlightInfo>, Status> {
        self.check_request(&request)?;
        let batch = self.tables_batch(query.clone()).await?;
        let info = flight_info(
            &batch.schema(),
            query.as_any().encode_to_vec(),
            request.into_inner(),
        )?;

        Ok(Response::new(info))
    }

    async fn do_get_tables(
        &self,
        query: CommandGetTables,
        request: Request<Ticket>,
    ) -> Result<Response<DoGetStream>, Status> {
        self.check_request(&request)?;
        debug!(
            catalog = ?query.catalog,
            schema = ?query.db_schema_filter_pattern,
            table = ?query.table_name_filter_pattern,
            include_schema = query.include_schema,
            "listing tables"
        );
        let batch = self.tables_batch(query).await?;

        Ok(Response::new(encode(batch.schema(), vec![batch])))
    }

    async fn get_flight_info_table_types(
        &self,
        query: CommandGetTableTypes,
        request: Request<FlightDescriptor>,
    ) -> Result<Response<FlightInfo>, Status> {
        self.check_request(&request)?;
        let batch = self.table_types_batch()?;
        let info = flight_info(
            &batch.schema(),
            query.as_any().encode_to_vec(),
            request.into_inner(),
        )?;

        Ok(Response::new(info))
    }

    async fn do_get_table_types(
        &self,
        _query: CommandGetTableTypes,
        request: Request<Ticket>,
    ) -> Result<Response<DoGetStream>, Status> {
        self.check_request(&request)?;
        let batch = self.table_types_batch()?;

        Ok(Response::new(encode(batch.schema(), vec![batch])))
    }

    async fn register_sql_info(&self, _id: i32, _result: &SqlInfo) {}
}

/// A single endpoint whose ticket is redeemed on this server
fn flight_info(
    schema: &Schema,
    ticket: Vec<u8>,
    descriptor: FlightDescriptor,
) -> Result<FlightInfo, Status> {
    let endpoint = FlightEndpoint::new().with_ticket(Ticket::new(ticket));

    Ok(FlightInfo::new()
        .try_with_schema(schema)
        .map_err(to_arrow_err)?
        .with_endpoint(endpoint)
        .with_descriptor(descriptor))
}

fn encode(schema: SchemaRef, batches: Vec<RecordBatch>) -> DoGetStream {
    let batches = stream::iter(batches.into_iter().map(Ok::<_, FlightError>));
    let flights = FlightDataEncoderBuilder::new()
        .with_schema(schema)
        .build(batches)
        .map_err(|e| Status::internal(e.to_string()));

    Box::pin(flights)
}

fn to_tonic_err(e: datafusion::error::DataFusionError) -> Status {
    Status::internal(format!("{e:?}"))
}

fn to_arrow_err(e: ArrowError) -> Status {
    Status::internal(e.to_string())
}

fn to_flight_err(e: FlightError) -> Status {
    Status::internal(e.to_string())
}
