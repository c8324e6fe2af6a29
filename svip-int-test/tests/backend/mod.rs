mod backend_attributes_test;
mod fjall_backend_test;
