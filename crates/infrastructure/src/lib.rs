pub mod in_memory_queue;
pub mod memory_repository;
pub mod redis_queue;

pub use in_memory_queue::InMemoryTaskQueue;
pub use memory_repository::InMemoryModuleRunRepository;
pub use redis_queue::RedisTaskQueue;
