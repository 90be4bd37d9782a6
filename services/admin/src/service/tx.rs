//! Scoped transactions over a [`Session`].
//!
//! Transactions do not nest: when the session already has one open, the
//! work joins it and the outermost caller decides commit or rollback.
use crate::context::OpContext;
use crate::service::{ServiceError, ServiceResult};
use crate::store::Session;
use futures::future::BoxFuture;

/// Run `work` inside a transaction on `session`.
///
/// Waiting to begin counts against the context deadline. Rolls back when
/// `work` fails or the deadline passes before it finishes, commits otherwise. The first error is returned unchanged.
///
/// `work` receives the session back and must only capture owned values:
///
/// ```rust,ignore
/// run_in_transaction(&ctx, session, |s| {
///     Box::pin(async move {
///         s.delete_menu(&id).await?;
///         Ok(())
///     })
/// })
/// .await?;
/// ```
pub async fn run_in_transaction<T, F>(
    ctx: &OpContext,
    session: &mut dyn Session,
    work: F,
) -> ServiceResult<T>
where
    T: Send,
    F: for<'s> FnOnce(&'s mut dyn Session) -> BoxFuture<'s, ServiceResult<T>> + Send,
{
    if session.in_transaction() {
        return work(session).await;
    }

    ctx.run(session.begin()).await??;
    let outcome = ctx.run(work(&mut *session)).await;
    match outcome {
        Ok(Ok(value)) => {
            session.commit().await?;
            Ok(value)
        }
        Ok(Err(err)) => {
            rollback_quietly(session).await;
            Err(err)
        }
        Err(cancelled) => {
            rollback_quietly(session).await;
            Err(ServiceError::from(cancelled))
        }
    }
}

async fn rollback_quietly(session: &mut dyn Session) {
    if let Err(err) = session.rollback().await {
        tracing::warn!(error = %err, "transaction rollback failed");
    }
}
