//! gRPC 服务端实现
//!
//! 将接入与查询契约暴露为 `OrderService` / `CacheService`，
//! 只负责 Proto 类型与内部模型之间的转换。

use std::sync::Arc;

use order_proto::order::{
    OrderRequest, OrderResponse, ResultRequest, ResultResponse,
    cache_service_server::CacheService, order_service_server::OrderService,
};
use order_shared::order::{OrderMessage, ProcessingResult};
use tonic::{Request, Response, Status};
use tracing::instrument;

use crate::intake::OrderIntake;
use crate::result::OrderResultQuery;

// ==================== 类型转换 ====================

fn to_order_message(req: OrderRequest) -> OrderMessage {
    OrderMessage::new(req.id, req.item, req.price)
}

fn to_proto_result(result: ProcessingResult) -> ResultResponse {
    ResultResponse {
        item: result.item,
        price: result.price,
        status: result.status.as_str().to_string(),
    }
}

// ==================== OrderService ====================

pub struct OrderGrpcService {
    intake: Arc<dyn OrderIntake>,
}

impl OrderGrpcService {
    pub fn new(intake: Arc<dyn OrderIntake>) -> Self {
        Self { intake }
    }
}

#[tonic::async_trait]
impl OrderService for OrderGrpcService {
    #[instrument(skip(self, request))]
    async fn create_order(
        &self,
        request: Request<OrderRequest>,
    ) -> Result<Response<OrderResponse>, Status> {
        let accepted = self
            .intake
            .create_order(to_order_message(request.into_inner()))
            .await?;

        Ok(Response::new(OrderResponse {
            status: accepted.status,
        }))
    }
}

// ==================== CacheService ====================

pub struct CacheGrpcService {
    query: Arc<dyn OrderResultQuery>,
}

impl CacheGrpcService {
    pub fn new(query: Arc<dyn OrderResultQuery>) -> Self {
        Self { query }
    }
}

#[tonic::async_trait]
impl CacheService for CacheGrpcService {
    #[instrument(skip(self, request), fields(order_id = %request.get_ref().id))]
    async fn get_order_result(
        &self,
        request: Request<ResultRequest>,
    ) -> Result<Response<ResultResponse>, Status> {
        let result = self.query.get_order_result(&request.get_ref().id).await?;
        Ok(Response::new(to_proto_result(result)))
    }
}
