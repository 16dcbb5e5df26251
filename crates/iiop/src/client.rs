//! High-level invocation client
//!
//! Resolves an object reference to endpoints, fails over along them through a
//! pooled [`ConnectionManager`], and turns replies into results. Requests go
//! out in the lower of the profile's IIOP version and the configured one.
//! The call context of the current task travels with every request, and the
//! first request on a connection announces the code sets chosen from the
//! target's code-set component.

use crate::marshal::PayloadMarshaler;
use crate::resolver::EndpointResolver;
use crate::types::{ObjectReference, OrbError, Result};
use bytes::Bytes;
use cdr::CdrWriter;
use giop::{
    policy_type, CallContext, ConnectionManager, ConnectionManagerConfig, Connector, GiopConnection,
    GiopError, GiopVersion, LocateStatus, PolicySet, ReplyMessage, ReplyStatus, RequestMessage,
    TargetAddress, TcpConnector,
};
use tracing::debug;

/// Default bound on LOCATION_FORWARD hops per invocation
pub const DEFAULT_MAX_FORWARDS: usize = 8;

/// Builder for invocation clients
pub struct OrbClientBuilder<C: Connector = TcpConnector> {
    connector: C,
    config: ConnectionManagerConfig,
    policies: PolicySet,
    max_forwards: usize,
}

impl OrbClientBuilder<TcpConnector> {
    pub fn new() -> Self {
        Self {
            connector: TcpConnector,
            config: ConnectionManagerConfig::default(),
            policies: PolicySet::new(),
            max_forwards: DEFAULT_MAX_FORWARDS,
        }
    }
}

impl Default for OrbClientBuilder<TcpConnector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> OrbClientBuilder<C> {
    /// Open streams through `connector` instead of plain TCP
    pub fn connector<C2: Connector>(self, connector: C2) -> OrbClientBuilder<C2> {
        OrbClientBuilder {
            connector,
            config: self.config,
            policies: self.policies,
            max_forwards: self.max_forwards,
        }
    }

    pub fn config(mut self, config: ConnectionManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Client-wide policy; per-call overrides take precedence
    pub fn policy(mut self, policy: impl giop::Policy + 'static) -> Self {
        self.policies.set(policy);
        self
    }

    pub fn max_forwards(mut self, max_forwards: usize) -> Self {
        self.max_forwards = max_forwards;
        self
    }

    pub fn build(self) -> OrbClient<C> {
        OrbClient {
            manager: ConnectionManager::with_connector(self.connector, self.config),
            policies: self.policies,
            max_forwards: self.max_forwards,
        }
    }
}

/// Client for invoking operations on remote objects
pub struct OrbClient<C: Connector = TcpConnector> {
    manager: ConnectionManager<C>,
    policies: PolicySet,
    max_forwards: usize,
}

impl OrbClient<TcpConnector> {
    pub fn new() -> Self {
        OrbClientBuilder::new().build()
    }

    pub fn builder() -> OrbClientBuilder<TcpConnector> {
        OrbClientBuilder::new()
    }
}

impl Default for OrbClient<TcpConnector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> OrbClient<C> {
    pub fn manager(&self) -> &ConnectionManager<C> {
        &self.manager
    }

    pub fn policies(&self) -> &PolicySet {
        &self.policies
    }

    /// Invoke `operation` and wait for its result
    pub async fn invoke<M: PayloadMarshaler>(
        &self,
        target: &ObjectReference,
        operation: &str,
        marshaler: &M,
        args: &M::Args,
    ) -> Result<M::Output> {
        self.invoke_with(target, operation, marshaler, args, &PolicySet::new())
            .await
    }

    /// Invoke with per-call policy overrides
    pub async fn invoke_with<M: PayloadMarshaler>(
        &self,
        target: &ObjectReference,
        operation: &str,
        marshaler: &M,
        args: &M::Args,
        overrides: &PolicySet,
    ) -> Result<M::Output> {
        let policies = self.policies.merged(overrides);
        let mut target = target.clone();
        let mut forwards = 0;

        loop {
            let reply = self
                .send(&target, operation, marshaler, args, &policies, true)
                .await?
                .ok_or_else(|| OrbError::NoReply {
                    operation: operation.to_string(),
                })?;

            match reply.reply_status {
                ReplyStatus::NoException => {
                    return marshaler.decode_payload(operation, &mut reply.body_reader());
                }
                ReplyStatus::UserException => {
                    let mut reader = reply.body_reader();
                    let repository_id: String = reader.read()?;
                    return Err(OrbError::UserException {
                        repository_id,
                        body: reader.rest(),
                    });
                }
                ReplyStatus::SystemException => {
                    return Err(OrbError::SystemException(reply.system_exception()?));
                }
                ReplyStatus::LocationForward | ReplyStatus::LocationForwardPerm => {
                    forwards += 1;
                    if forwards > self.max_forwards {
                        return Err(OrbError::TooManyForwards {
                            limit: self.max_forwards,
                        });
                    }
                    target = forwarded_reference(&reply)?;
                    debug!("{} forwarded to {:?} (hop {})", operation, target.type_id(), forwards);
                }
                ReplyStatus::NeedsAddressingMode => {
                    let disposition: u16 = reply.body_reader().read()?;
                    return Err(GiopError::UnsupportedTargetAddress(disposition).into());
                }
            }
        }
    }

    /// Send a oneway request; no reply is awaited
    pub async fn invoke_oneway<M: PayloadMarshaler>(
        &self,
        target: &ObjectReference,
        operation: &str,
        marshaler: &M,
        args: &M::Args,
    ) -> Result<()> {
        self.send(target, operation, marshaler, args, &self.policies, false)
            .await?;
        Ok(())
    }

    /// Ask where the target lives. Returns the reference to use for it:
    /// `target` itself, or the reference the server forwards to.
    pub async fn locate(&self, target: &ObjectReference) -> Result<ObjectReference> {
        let resolver = EndpointResolver::from_policies(&self.policies);
        let profile = resolver.primary_profile(target)?;
        let endpoints = resolver.endpoints_of(&profile);

        let version = self.manager.config().negotiate(profile.version);
        let conn = self.manager.acquire(&endpoints, &self.policies).await?;
        let result = conn
            .locate(
                TargetAddress::ObjectKey(profile.object_key),
                version,
                self.policies.duration(policy_type::REQUEST_TIMEOUT),
            )
            .await;
        self.manager.release(&conn);
        let reply = result?;

        match reply.locate_status {
            LocateStatus::ObjectHere => Ok(target.clone()),
            LocateStatus::UnknownObject => Err(OrbError::ObjectNotExist),
            LocateStatus::ObjectForward | LocateStatus::ObjectForwardPerm => {
                ObjectReference::decode(&mut reply.body_reader())
            }
            LocateStatus::LocSystemException => {
                Err(OrbError::SystemException(reply.body_reader().read()?))
            }
            LocateStatus::LocNeedsAddressingMode => {
                let disposition: u16 = reply.body_reader().read()?;
                Err(GiopError::UnsupportedTargetAddress(disposition).into())
            }
        }
    }

    /// Close every pooled connection
    pub async fn shutdown(&self) {
        self.manager.close_all().await;
    }

    async fn send<M: PayloadMarshaler>(
        &self,
        target: &ObjectReference,
        operation: &str,
        marshaler: &M,
        args: &M::Args,
        policies: &PolicySet,
        response_expected: bool,
    ) -> Result<Option<ReplyMessage>> {
        let resolver = EndpointResolver::from_policies(policies);
        let profile = resolver.primary_profile(target)?;
        let endpoints = resolver.endpoints_of(&profile);

        let config = self.manager.config();
        let version = config.negotiate(profile.version);
        // GIOP 1.0 has no code-set negotiation
        let proposed = match profile.code_sets()? {
            Some(offer) if version >= GiopVersion::V1_1 => Some(offer.negotiate()?),
            _ => None,
        };
        let context = CallContext::current().unwrap_or_default();
        let call_context = context.to_service_context(config.byte_order)?;
        let idempotent = marshaler.is_idempotent(operation);

        let build = |conn: &GiopConnection| -> Result<RequestMessage> {
            let (sets, announce) = conn.code_sets().establish(proposed);
            let mut request =
                RequestMessage::new(profile.object_key.clone(), operation, Bytes::new());
            request.response_expected = response_expected;
            if announce {
                request
                    .service_contexts
                    .push(sets.to_service_context(config.byte_order)?);
            }
            request.service_contexts.extend(call_context.clone());

            let offset = request.body_offset(version, config.byte_order)?;
            let mut writer = CdrWriter::with_position(sets.apply(config.byte_order), offset);
            marshaler.encode_payload(operation, args, &mut writer)?;
            request.body = writer.into_bytes();
            Ok(request)
        };
        self.manager
            .invoke_with(&endpoints, version, idempotent, policies, build)
            .await
    }
}

fn forwarded_reference(reply: &ReplyMessage) -> Result<ObjectReference> {
    let reference = ObjectReference::decode(&mut reply.body_reader())?;
    if reference.is_nil() {
        return Err(OrbError::InvalidObjectReference(
            "nil reference in LOCATION_FORWARD".to_string(),
        ));
    }
    Ok(reference)
}
