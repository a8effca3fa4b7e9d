// src/socket/patterns/mod.rs

pub mod distributor;
pub mod fair_queue;
pub mod load_balancer;
pub mod router;
pub mod trie;

pub(crate) use distributor::Distributor;
pub(crate) use fair_queue::FairQueue;
pub(crate) use load_balancer::LoadBalancer;
pub(crate) use router::{HeaderState, ReplyRouter, RouteOutcome};
pub(crate) use trie::SubscriptionTrie;
