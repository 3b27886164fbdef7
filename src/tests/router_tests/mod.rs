mod search_route_tests;
