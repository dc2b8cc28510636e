use crate::error::BotError;
use crate::models::{OrderSide, OrderType};
use crate::Result;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

pub type OrderId = i64;

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: u64,
    pub order_type: OrderType,
}

impl OrderRequest {
    pub fn market(symbol: &str, side: OrderSide, quantity: u64) -> Self {
        Self::new(symbol, side, quantity, None)
    }

    pub fn new(symbol: &str, side: OrderSide, quantity: u64, limit_price: Option<f64>) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            quantity,
            order_type: OrderType::from_limit(limit_price),
        }
    }
}

/// Narrow view of the broker used by the strategy loop
///
/// `place` dispatches the order and returns its id. It does not wait for a
/// fill: the order is placed, not settled.
pub trait OrderGateway {
    fn place(&self, request: &OrderRequest) -> Result<OrderId>;
}

impl<G: OrderGateway + ?Sized> OrderGateway for Arc<G> {
    fn place(&self, request: &OrderRequest) -> Result<OrderId> {
        (**self).place(request)
    }
}

/// Shared "next order id" counter
///
/// Seeded by the broker's next-valid-id notification (delivered through the
/// listener) and advanced by the strategy loop. All access goes through the
/// mutex, so two orders never receive the same id.
#[derive(Debug, Clone, Default)]
pub struct OrderIdSequence {
    next: Arc<Mutex<Option<OrderId>>>,
}

impl OrderIdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<OrderId>> {
        self.next.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Accept the broker's next valid id. Never moves the counter backwards.
    pub fn seed(&self, id: OrderId) {
        let mut next = self.lock();
        *next = Some(next.map_or(id, |current| current.max(id)));
    }

    /// Take the next id and advance the counter
    pub fn next_id(&self) -> Result<OrderId> {
        let mut next = self.lock();
        let id = next.ok_or(BotError::OrderIdUnavailable)?;
        *next = Some(id + 1);
        Ok(id)
    }

    /// Id the next order would get, without consuming it
    pub fn peek(&self) -> Option<OrderId> {
        *self.lock()
    }
}

/// Inbound notification from the broker session
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    NextValidId(OrderId),
    Error {
        request_id: i64,
        code: i32,
        message: String,
    },
}

/// Background listener for broker notifications
///
/// Only touches the order id counter; errors are logged and never reach the
/// strategy loop as faults. `ready` is published after every seed.
pub fn spawn_listener(
    mut events: mpsc::UnboundedReceiver<BrokerEvent>,
    ids: OrderIdSequence,
    ready: watch::Sender<Option<OrderId>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                BrokerEvent::NextValidId(id) => {
                    ids.seed(id);
                    ready.send_replace(Some(id));
                    tracing::info!(order_id = id, "Next valid order id");
                }
                BrokerEvent::Error {
                    request_id,
                    code,
                    message,
                } => {
                    tracing::error!(request_id, code, "Broker error: {}", message);
                }
            }
        }
        tracing::debug!("Broker event channel closed, listener exiting");
    })
}

/// Broker session plumbing: event channel, listener task and id counter
pub struct BrokerSession {
    events: mpsc::UnboundedSender<BrokerEvent>,
    listener: JoinHandle<()>,
    ids: OrderIdSequence,
    ready: watch::Receiver<Option<OrderId>>,
}

impl BrokerSession {
    /// Must be called from within a tokio runtime
    pub fn start() -> Self {
        let (events, rx) = mpsc::unbounded_channel();
        let (ready_tx, ready) = watch::channel(None);
        let ids = OrderIdSequence::new();
        let listener = spawn_listener(rx, ids.clone(), ready_tx);

        Self {
            events,
            listener,
            ids,
            ready,
        }
    }

    /// Wait until the listener has processed a next-valid-id notification
    ///
    /// Fails with `OrderIdUnavailable` if the listener exits first.
    pub async fn wait_for_order_id(&self) -> Result<OrderId> {
        if let Some(id) = self.ids.peek() {
            return Ok(id);
        }

        let mut ready = self.ready.clone();
        let id = ready
            .wait_for(|id| id.is_some())
            .await
            .map_err(|_| BotError::OrderIdUnavailable)?;

        (*id).ok_or(BotError::OrderIdUnavailable)
    }

    /// Sender the external session adapter posts notifications to
    pub fn events(&self) -> mpsc::UnboundedSender<BrokerEvent> {
        self.events.clone()
    }

    pub fn order_ids(&self) -> OrderIdSequence {
        self.ids.clone()
    }

    /// Close the event channel and wait for the listener to drain it
    ///
    /// Outstanding senders handed out by `events()` must be dropped first.
    pub async fn shutdown(self) {
        drop(self.events);
        if let Err(e) = self.listener.await {
            tracing::warn!("Broker listener ended abnormally: {}", e);
        }
    }
}

/// An order as dispatched by the paper gateway
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub order_id: OrderId,
    pub request: OrderRequest,
}

/// Gateway that logs orders instead of routing them to a broker
///
/// Hands out ids from the shared sequence exactly like a live adapter, so the
/// handshake and id bookkeeping are exercised in simulation.
#[derive(Debug, Clone)]
pub struct PaperGateway {
    ids: OrderIdSequence,
    placed: Arc<Mutex<Vec<PlacedOrder>>>,
}

impl PaperGateway {
    pub fn new(ids: OrderIdSequence) -> Self {
        Self {
            ids,
            placed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Connect to a session, performing the next-valid-id handshake
    ///
    /// Returns once the listener has seeded the id counter, so the first
    /// order placed afterwards always gets an id.
    pub async fn connect(session: &BrokerSession, first_order_id: OrderId) -> Result<Self> {
        if session
            .events()
            .send(BrokerEvent::NextValidId(first_order_id))
            .is_err()
        {
            tracing::warn!("Broker listener is not running, seeding ids directly");
            session.order_ids().seed(first_order_id);
        }

        let next_id = session.wait_for_order_id().await?;
        tracing::info!(order_id = next_id, "Broker handshake complete");

        Ok(Self::new(session.order_ids()))
    }

    /// Orders placed so far, in dispatch order
    pub fn placed(&self) -> Vec<PlacedOrder> {
        self.placed
            .lock()
            .map(|orders| orders.clone())
            .unwrap_or_default()
    }
}

impl OrderGateway for PaperGateway {
    fn place(&self, request: &OrderRequest) -> Result<OrderId> {
        if request.quantity == 0 {
            return Err(BotError::InvalidQuantity(request.quantity));
        }

        let order_id = self.ids.next_id()?;

        tracing::info!(
            order_id,
            symbol = %request.symbol,
            side = %request.side,
            quantity = request.quantity,
            order_type = request.order_type.code(),
            "Placed paper order"
        );

        if let Ok(mut placed) = self.placed.lock() {
            placed.push(PlacedOrder {
                order_id,
                request: request.clone(),
            });
        }

        Ok(order_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_requires_seed() {
        let ids = OrderIdSequence::new();
        assert!(matches!(ids.next_id(), Err(BotError::OrderIdUnavailable)));

        ids.seed(10);
        assert_eq!(ids.next_id().unwrap(), 10);
        assert_eq!(ids.next_id().unwrap(), 11);
        assert_eq!(ids.peek(), Some(12));
    }

    #[test]
    fn test_seed_never_moves_backwards() {
        let ids = OrderIdSequence::new();
        ids.seed(5);
        ids.next_id().unwrap();
        ids.next_id().unwrap();

        ids.seed(3);
        assert_eq!(ids.next_id().unwrap(), 7);

        ids.seed(100);
        assert_eq!(ids.next_id().unwrap(), 100);
    }

    #[test]
    fn test_ids_unique_across_threads() {
        use std::collections::HashSet;
        use std::thread;

        let ids = OrderIdSequence::new();
        ids.seed(1);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = ids.clone();
                thread::spawn(move || (0..250).map(|_| ids.next_id().unwrap()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate order id {}", id);
            }
        }
        assert_eq!(seen.len(), 1000);
    }

    #[test]
    fn test_order_request_type() {
        let market = OrderRequest::market("AAPL", OrderSide::Buy, 2);
        assert_eq!(market.order_type, OrderType::Market);

        let limit = OrderRequest::new("AAPL", OrderSide::Sell, 2, Some(101.5));
        assert_eq!(limit.order_type, OrderType::Limit(101.5));
    }

    #[tokio::test]
    async fn test_listener_seeds_sequence() {
        let session = BrokerSession::start();
        let ids = session.order_ids();

        let events = session.events();
        events.send(BrokerEvent::NextValidId(42)).unwrap();
        events
            .send(BrokerEvent::Error {
                request_id: -1,
                code: 2104,
                message: "Market data farm connection is OK".to_string(),
            })
            .unwrap();
        drop(events);

        session.shutdown().await;
        assert_eq!(ids.peek(), Some(42));
    }

    #[tokio::test]
    async fn test_connect_waits_for_handshake() {
        let session = BrokerSession::start();
        let gateway = PaperGateway::connect(&session, 5).await.unwrap();

        // No yield between connect and the first order
        let order_id = gateway
            .place(&OrderRequest::market("AAPL", OrderSide::Buy, 1))
            .unwrap();

        assert_eq!(order_id, 5);
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_wait_for_order_id_fails_without_listener() {
        let mut session = BrokerSession::start();
        session.listener.abort();
        let _ = (&mut session.listener).await;

        assert!(matches!(
            session.wait_for_order_id().await,
            Err(BotError::OrderIdUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_paper_gateway_places_orders() {
        let session = BrokerSession::start();
        let gateway = PaperGateway::connect(&session, 1).await.unwrap();
        let ids = session.order_ids();
        session.shutdown().await;
        assert_eq!(ids.peek(), Some(1));

        let first = gateway
            .place(&OrderRequest::market("AAPL", OrderSide::Buy, 1))
            .unwrap();
        let second = gateway
            .place(&OrderRequest::market("AAPL", OrderSide::Sell, 1))
            .unwrap();

        assert_eq!((first, second), (1, 2));
        let placed = gateway.placed();
        assert_eq!(placed.len(), 2);
        assert_eq!(placed[1].request.side, OrderSide::Sell);
    }

    #[test]
    fn test_paper_gateway_rejects_zero_quantity() {
        let ids = OrderIdSequence::new();
        ids.seed(1);
        let gateway = PaperGateway::new(ids.clone());

        let result = gateway.place(&OrderRequest::market("AAPL", OrderSide::Buy, 0));
        assert!(matches!(result, Err(BotError::InvalidQuantity(0))));
        assert_eq!(ids.peek(), Some(1));
        assert!(gateway.placed().is_empty());
    }
}
