mod helpers;
mod stability;
mod property_tests;
