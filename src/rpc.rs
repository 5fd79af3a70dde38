// src/rpc.rs
use std::fmt::Display;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::{Bytes, H256, U256};
use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::types::error::ErrorObjectOwned;
use jsonrpsee::types::ErrorObject;
use tracing::{debug, error};

use crate::aggregator::{BlsSignatureAggregator, SignatureAggregator};
use crate::bls::get_trailing_public_key;
use crate::types::PackedUserOperation;

// Stateless helpers a bundler needs to build aggregated bundles
#[rpc(server, namespace = "bls")]
pub trait BlsRpc {
    #[method(name = "getUserOpHash")]
    async fn get_user_op_hash(&self, user_op: PackedUserOperation) -> RpcResult<H256>;

    /// Message point the sender's key must sign, as two words.
    #[method(name = "userOpToMessage")]
    async fn user_op_to_message(&self, user_op: PackedUserOperation) -> RpcResult<[U256; 2]>;

    #[method(name = "aggregateSignatures")]
    async fn aggregate_signatures(&self, user_ops: Vec<PackedUserOperation>) -> RpcResult<Bytes>;

    #[method(name = "getTrailingPublicKey")]
    async fn get_trailing_public_key(&self, data: Bytes) -> RpcResult<[U256; 4]>;
}

pub struct BlsRpcImpl {
    aggregator: Arc<BlsSignatureAggregator>,
}

impl BlsRpcImpl {
    pub fn new(aggregator: Arc<BlsSignatureAggregator>) -> Self {
        Self { aggregator }
    }
}

fn rpc_error(method: &str, err: impl Display) -> ErrorObjectOwned {
    error!("{} failed: {}", method, err);
    ErrorObject::owned(-32602, format!("BLS error: {}", err), None::<()>)
}

#[async_trait]
impl BlsRpcServer for BlsRpcImpl {
    async fn get_user_op_hash(&self, user_op: PackedUserOperation) -> RpcResult<H256> {
        debug!("Received getUserOpHash for sender: {:?}", user_op.sender);
        Ok(self.aggregator.get_user_op_hash(&user_op))
    }

    async fn user_op_to_message(&self, user_op: PackedUserOperation) -> RpcResult<[U256; 2]> {
        debug!("Received userOpToMessage for sender: {:?}", user_op.sender);
        self.aggregator
            .user_op_to_message_words(&user_op)
            .map_err(|e| rpc_error("userOpToMessage", e).into())
    }

    async fn aggregate_signatures(&self, user_ops: Vec<PackedUserOperation>) -> RpcResult<Bytes> {
        debug!("Received aggregateSignatures for {} ops", user_ops.len());
        self.aggregator
            .aggregate_signatures(&user_ops)
            .map_err(|e| rpc_error("aggregateSignatures", e).into())
    }

    async fn get_trailing_public_key(&self, data: Bytes) -> RpcResult<[U256; 4]> {
        get_trailing_public_key(&data).map_err(|e| rpc_error("getTrailingPublicKey", e).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bls::{BlsDomain, BlsSecretKey};
    use ethers::types::Address;
    use ethers::utils::keccak256;

    fn service() -> BlsRpcImpl {
        BlsRpcImpl::new(Arc::new(BlsSignatureAggregator::new(
            Address::zero(),
            Address::repeat_byte(0xe9),
            1,
            BlsDomain::default(),
        )))
    }

    #[tokio::test]
    async fn test_trailing_public_key() {
        let words: Vec<u8> = (1u64..=6)
            .flat_map(|i| {
                let mut word = [0u8; 32];
                U256::from(i).to_big_endian(&mut word);
                word
            })
            .collect();
        let key = service().get_trailing_public_key(Bytes::from(words)).await.unwrap();
        assert_eq!(key, [3u64, 4, 5, 6].map(U256::from));
        assert!(service()
            .get_trailing_public_key(Bytes::from(vec![0u8; 127]))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_aggregate_signatures() {
        let sk = BlsSecretKey::from_bytes(&keccak256(b"rpc")).unwrap();
        let signature = sk.sign(&BlsDomain::default(), b"hello").unwrap();
        let user_op = PackedUserOperation {
            signature: Bytes::from(signature.to_bytes().to_vec()),
            ..Default::default()
        };
        let aggregated = service().aggregate_signatures(vec![user_op.clone()]).await.unwrap();
        assert_eq!(aggregated, user_op.signature);

        let truncated = PackedUserOperation {
            signature: Bytes::from(vec![1u8; 10]),
            ..Default::default()
        };
        assert!(service().aggregate_signatures(vec![truncated]).await.is_err());
    }

    #[tokio::test]
    async fn test_message_matches_hash() {
        let service = service();
        let user_op = PackedUserOperation::default();
        let hash = service.get_user_op_hash(user_op.clone()).await.unwrap();
        assert_eq!(hash, user_op.hash(Address::repeat_byte(0xe9), 1));
        assert_eq!(
            service.user_op_to_message(user_op.clone()).await.unwrap(),
            service.aggregator.user_op_to_message_words(&user_op).unwrap()
        );
    }
}
