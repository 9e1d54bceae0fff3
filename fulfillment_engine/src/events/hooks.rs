use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    CommissionOverdueEvent,
    DispatchExhaustedEvent,
    EventHandler,
    EventProducer,
    Handler,
    OrderAnnulledEvent,
    OrderAssignedEvent,
    OrderCompletedEvent,
};

/// The producer side handed to the engine APIs. Cloneable; every API that fires a given event
/// publishes to every producer registered for it.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_assigned: Vec<EventProducer<OrderAssignedEvent>>,
    pub order_completed: Vec<EventProducer<OrderCompletedEvent>>,
    pub order_annulled: Vec<EventProducer<OrderAnnulledEvent>>,
    pub dispatch_exhausted: Vec<EventProducer<DispatchExhaustedEvent>>,
    pub commission_overdue: Vec<EventProducer<CommissionOverdueEvent>>,
}

pub struct EventHandlers {
    pub on_order_assigned: Option<EventHandler<OrderAssignedEvent>>,
    pub on_order_completed: Option<EventHandler<OrderCompletedEvent>>,
    pub on_order_annulled: Option<EventHandler<OrderAnnulledEvent>>,
    pub on_dispatch_exhausted: Option<EventHandler<DispatchExhaustedEvent>>,
    pub on_commission_overdue: Option<EventHandler<CommissionOverdueEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        Self {
            on_order_assigned: hooks.on_order_assigned.map(|f| EventHandler::new(buffer_size, f)),
            on_order_completed: hooks.on_order_completed.map(|f| EventHandler::new(buffer_size, f)),
            on_order_annulled: hooks.on_order_annulled.map(|f| EventHandler::new(buffer_size, f)),
            on_dispatch_exhausted: hooks.on_dispatch_exhausted.map(|f| EventHandler::new(buffer_size, f)),
            on_commission_overdue: hooks.on_commission_overdue.map(|f| EventHandler::new(buffer_size, f)),
        }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_assigned {
            result.order_assigned.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_completed {
            result.order_completed.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_annulled {
            result.order_annulled.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_dispatch_exhausted {
            result.dispatch_exhausted.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_commission_overdue {
            result.commission_overdue.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_assigned {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_order_completed {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_order_annulled {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_dispatch_exhausted {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_commission_overdue {
            tokio::spawn(handler.start_handler());
        }
    }
}

/// Free-form async hooks the embedding application registers before building [`EventHandlers`].
#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_assigned: Option<Handler<OrderAssignedEvent>>,
    pub on_order_completed: Option<Handler<OrderCompletedEvent>>,
    pub on_order_annulled: Option<Handler<OrderAnnulledEvent>>,
    pub on_dispatch_exhausted: Option<Handler<DispatchExhaustedEvent>>,
    pub on_commission_overdue: Option<Handler<CommissionOverdueEvent>>,
}

impl EventHooks {
    pub fn on_order_assigned<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderAssignedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_assigned = Some(Arc::new(f));
        self
    }

    pub fn on_order_completed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderCompletedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_completed = Some(Arc::new(f));
        self
    }

    pub fn on_order_annulled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderAnnulledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_annulled = Some(Arc::new(f));
        self
    }

    pub fn on_dispatch_exhausted<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(DispatchExhaustedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_dispatch_exhausted = Some(Arc::new(f));
        self
    }

    pub fn on_commission_overdue<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(CommissionOverdueEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_commission_overdue = Some(Arc::new(f));
        self
    }
}
