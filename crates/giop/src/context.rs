//! Call context propagation
//!
//! A [`CallContext`] is an ordered set of named string values that travels
//! with one logical invocation. On the wire it rides in the request's
//! service context list under [`CALL_CONTEXT_SERVICE_ID`] as an
//! encapsulated `sequence<string>` of alternating names and values.
//!
//! Locally the context is bound to the invocation's future with a tokio
//! task-local, so it follows the call across worker threads and is never
//! seen by another invocation.

use crate::error::Result;
use crate::giop::ServiceContext;
use cdr::{CdrContext, CdrError, CdrReader, Encapsulation};
use std::future::Future;

/// Service context id carrying a [`CallContext`]
pub const CALL_CONTEXT_SERVICE_ID: u32 = 0x4343_5458;

tokio::task_local! {
    static CURRENT_CONTEXT: CallContext;
}

/// A named context value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextElement {
    pub value: String,
}

/// Ordered mapping from context name to element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    elements: Vec<(String, ContextElement)>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name`; an existing entry keeps its position and gets the new value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let element = ContextElement {
            value: value.into(),
        };
        match self.elements.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = element,
            None => self.elements.push((name, element)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ContextElement> {
        self.elements
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, element)| element)
    }

    pub fn remove(&mut self, name: &str) -> Option<ContextElement> {
        let index = self.elements.iter().position(|(n, _)| n == name)?;
        Some(self.elements.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ContextElement)> {
        self.elements.iter().map(|(n, e)| (n.as_str(), e))
    }

    /// Run `future` with this context as the current one.
    pub async fn scope<F: Future>(self, future: F) -> F::Output {
        CURRENT_CONTEXT.scope(self, future).await
    }

    /// The context of the invocation being executed, if any
    pub fn current() -> Option<CallContext> {
        CURRENT_CONTEXT.try_with(|ctx| ctx.clone()).ok()
    }

    /// Encode as a service context entry; an empty context yields none.
    pub fn to_service_context(&self, ctx: CdrContext) -> Result<Option<ServiceContext>> {
        if self.is_empty() {
            return Ok(None);
        }
        let data = Encapsulation::encode(ctx, |w| {
            let flattened: Vec<&str> = self
                .elements
                .iter()
                .flat_map(|(n, e)| [n.as_str(), e.value.as_str()])
                .collect();
            w.write(&flattened)
        })?;
        Ok(Some(ServiceContext::new(CALL_CONTEXT_SERVICE_ID, data)))
    }

    /// Rebuild the context carried in a service context list.
    pub fn from_service_contexts(list: &[ServiceContext]) -> Result<CallContext> {
        let Some(entry) = ServiceContext::find(list, CALL_CONTEXT_SERVICE_ID) else {
            return Ok(CallContext::new());
        };
        let mut reader = CdrReader::encapsulation(entry.context_data.clone())?;
        let flattened: Vec<String> = reader.read()?;
        if flattened.len() % 2 != 0 {
            return Err(CdrError::InvalidString(format!(
                "odd number of call context strings: {}",
                flattened.len()
            ))
            .into());
        }
        let mut context = CallContext::new();
        let mut items = flattened.into_iter();
        while let (Some(name), Some(value)) = (items.next(), items.next()) {
            context.insert(name, value);
        }
        Ok(context)
    }
}
