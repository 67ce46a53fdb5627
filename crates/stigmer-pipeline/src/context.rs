//! Shared typed context threaded through a pipeline run.

use std::any::Any;
use std::collections::HashMap;

/// Context for one request: the typed request, the typed resource slots,
/// and a string-keyed bag for step intermediates.
///
/// `Req` is the request message type; `R` the resource kind under
/// construction. Step *inputs* come from the typed slots; the bag is for
/// intermediates only.
pub struct RequestContext<Req, R> {
    request: Req,
    /// The mutable resource being constructed or updated.
    pub new_state: Option<R>,
    /// The currently persisted resource, when a load step ran.
    pub existing: Option<R>,
    /// Set by `LoadForApply`: whether Apply should delegate to Create.
    pub should_create: Option<bool>,
    /// Stringified resource id extracted from the request.
    pub resource_id: Option<String>,
    bag: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl<Req, R> RequestContext<Req, R> {
    /// Create a context around a request.
    #[must_use]
    pub fn new(request: Req) -> Self {
        Self {
            request,
            new_state: None,
            existing: None,
            should_create: None,
            resource_id: None,
            bag: HashMap::new(),
        }
    }

    /// The original typed request.
    #[must_use]
    pub fn request(&self) -> &Req {
        &self.request
    }

    /// Consume the context, returning the request.
    #[must_use]
    pub fn into_request(self) -> Req {
        self.request
    }

    /// Store an intermediate value.
    pub fn put<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.bag.insert(key.into(), Box::new(value));
    }

    /// Read an intermediate value by key and type.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.bag.get(key).and_then(|v| v.downcast_ref())
    }

    /// Remove and return an intermediate value.
    #[must_use]
    pub fn take<T: Any + Send + Sync>(&mut self, key: &str) -> Option<T> {
        let boxed = self.bag.remove(key)?;
        match boxed.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(boxed) => {
                // Wrong type requested; put it back untouched.
                self.bag.insert(key.to_string(), boxed);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bag_is_typed() {
        let mut ctx: RequestContext<(), ()> = RequestContext::new(());
        ctx.put("count", 3_u64);
        assert_eq!(ctx.get::<u64>("count"), Some(&3));
        assert_eq!(ctx.get::<String>("count"), None);
        assert_eq!(ctx.take::<u64>("count"), Some(3));
        assert_eq!(ctx.get::<u64>("count"), None);
    }

    #[test]
    fn take_with_wrong_type_preserves_value() {
        let mut ctx: RequestContext<(), ()> = RequestContext::new(());
        ctx.put("flag", true);
        assert_eq!(ctx.take::<String>("flag"), None);
        assert_eq!(ctx.get::<bool>("flag"), Some(&true));
    }
}
