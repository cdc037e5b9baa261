//! Remote call dispatcher.
//!
//! One packet is one call:
//!
//! ```text
//! packet ─► decode ─► call id ─► path! ?  ─► describe ─► /success id path json
//!                                  │
//!                                  └─► method ─► arity ─► types/constraints ─► handler
//! ```
//!
//! Every failure ends up as a `/fail` reply in the [`Outbox`]; the caller
//! flushes the outbox through [`Context::flush`] after each packet.

use chimaera_common::consts::QUERY_SENTINEL;
use chimaera_common::osc::{OscArg, OscMessage};
use tracing::debug;

use crate::context::Context;
use crate::error::{ConfigError, DispatchError};
use crate::handlers::validate::check_argument;
use crate::handlers::{Call, Handler, HandlerRegistry, Response, sockets};
use crate::query::{Entry, QueryArgument, QueryItem, QueryTree, ROOT};
use crate::reply::{Outbox, fail_bare};
use crate::resolver::Resolution;

/// Query tree with resolved handlers.
pub struct Dispatcher {
    tree: QueryTree,
    handlers: HandlerRegistry,
}

impl Dispatcher {
    /// Pair `tree` with `handlers`.
    ///
    /// # Panics
    /// Panics if a method of `tree` names a handler missing from `handlers`.
    pub fn new(tree: QueryTree, handlers: HandlerRegistry) -> Self {
        for (path, id, _) in tree.methods() {
            if handlers.get(id).is_none() {
                panic!("Method '{path}' names unregistered handler '{id}'");
            }
        }
        Self { tree, handlers }
    }

    /// The `/chimaera` namespace with the built-in handlers.
    pub fn with_defaults() -> Self {
        Self::new(QueryTree::build(&ROOT), HandlerRegistry::with_defaults())
    }

    pub fn tree(&self) -> &QueryTree {
        &self.tree
    }

    /// Handle one received packet.
    pub fn dispatch_packet(&self, ctx: &mut Context, packet: &[u8], out: &mut Outbox) {
        let msg = match OscMessage::decode(packet) {
            Ok(msg) => msg,
            Err(e) => {
                let err = DispatchError::Decode(e);
                debug!("Dropped packet: {}", err);
                out.push(fail_bare(err));
                return;
            }
        };
        self.dispatch(ctx, &msg, out);
    }

    /// Handle one decoded call.
    pub fn dispatch(&self, ctx: &mut Context, msg: &OscMessage, out: &mut Outbox) {
        let Some(OscArg::Int(id)) = msg.args.first() else {
            debug!("Call to {} without id", msg.path);
            out.push(fail_bare(DispatchError::MissingId));
            return;
        };
        let id = *id;

        if let Some(path) = msg.path.strip_suffix(QUERY_SENTINEL) {
            self.introspect(id, path, out);
            return;
        }

        let path = msg.path.as_str();
        let (entry, handler, decls) = match self.resolve(path) {
            Ok(found) => found,
            Err(err) => {
                debug!("Call {} to {} failed: {}", id, path, err);
                out.fail(id, path, err);
                return;
            }
        };

        let args = &msg.args[1..];
        if let Err(e) = validate(decls, args) {
            let err = DispatchError::Invalid(e);
            debug!("Call {} to {} failed: {}", id, path, err);
            out.fail(id, path, err);
            return;
        }

        let call = Call {
            id,
            path,
            args,
            index: entry.index,
        };
        match handler(ctx, &call, out) {
            Ok(Response::Ack) => out.success(id, path, Vec::new()),
            Ok(Response::Values(values)) => out.success(id, path, values),
            Ok(Response::Deferred) => {}
            Err(e) => {
                debug!("Call {} to {} failed: {}", id, path, e);
                out.fail(id, path, e);
            }
        }
    }

    /// Answer the call waiting on `resolution`.
    pub fn complete_resolution(&self, ctx: &mut Context, resolution: Resolution, out: &mut Outbox) {
        sockets::complete(ctx, resolution, out);
    }

    /// Drain every completed resolution. Returns how many were handled.
    pub fn poll(&self, ctx: &mut Context, out: &mut Outbox) -> usize {
        let mut handled = 0;
        while let Some(resolution) = ctx.poll_resolver() {
            self.complete_resolution(ctx, resolution, out);
            handled += 1;
        }
        handled
    }

    fn introspect(&self, id: i32, path: &str, out: &mut Outbox) {
        match self.tree.describe(path) {
            Some(Ok(json)) => out.success(id, path, vec![OscArg::string(json)]),
            Some(Err(e)) => out.fail(id, path, e),
            None => {
                debug!("Introspection of unknown path {}", path);
                out.fail(id, path, DispatchError::UnknownQuery);
            }
        }
    }

    fn resolve(&self, path: &str) -> Result<(Entry, Handler, &'static [QueryArgument]), DispatchError> {
        let entry = self.tree.get(path).ok_or(DispatchError::UnknownMethod)?;
        let QueryItem::Method { handler, args, .. } = entry.item else {
            return Err(DispatchError::UnknownMethod);
        };
        let handler = self.handlers.get(*handler).ok_or(DispatchError::UnknownMethod)?;
        Ok((*entry, handler, *args))
    }
}

/// Check `args` against the declared arguments.
///
/// The query form is valid when every declared argument is readable or
/// optional. The set form maps `args` onto the writable declarations in
/// order and requires every non-optional one.
pub fn validate(decls: &[QueryArgument], args: &[OscArg]) -> Result<(), ConfigError> {
    if args.is_empty() {
        if decls.iter().all(|d| d.mode.readable() || d.optional) {
            return Ok(());
        }
        return Err(ConfigError::Invalid("query form not supported".into()));
    }

    let writable: Vec<&QueryArgument> = decls.iter().filter(|d| d.mode.writable()).collect();
    let required = writable.iter().filter(|d| !d.optional).count();
    if args.len() < required || args.len() > writable.len() {
        return Err(ConfigError::Invalid(format!(
            "expects {} to {} arguments but got {}",
            required,
            writable.len(),
            args.len()
        )));
    }

    for (index, (decl, arg)) in writable.iter().zip(args).enumerate() {
        check_argument(index, decl, arg)?;
    }
    Ok(())
}
